// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Pipeline`: wires supervisor → parser → filter → dedupe → (ring buffer &
//! session tracker in parallel) → emitter into one tail invocation (§2, §5).
//!
//! Grounded on the teacher's `agent::worker` task-fan-out shape (one
//! supervising task per concern, bounded mpsc channels, a single
//! `Shutdown` token joined at `stop()`), generalized from one job runner to
//! one log-tailing session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use simtail_adapters::{ProducerSpawner, ProducerSupervisor, Severity, Shutdown, SupervisorEvent};
use simtail_core::dedupe::{DedupeFilter, DedupeMode};
use simtail_core::entry::{LogEntry, Timestamp};
use simtail_core::id::{IdGen, TailId};
use simtail_core::session::SessionTransition;
use simtail_core::{Clock, Config, ConfigError, SystemClock};
use simtail_storage::PatternStore;

use crate::emitter::{
    format_timestamp, metadata_payload, ClearBufferPayload, Emitter, GapPayload, LogPayload,
    OutputEvent, ReadyPayload, ReconnectNoticePayload, SessionEndPayload, SessionEndSummary,
    SessionStartPayload, StatsPayload, CONTRACT_VERSION,
};
use crate::filter::FilterEngine;
use crate::parser::{Parser, TimestampErrorHook};
use crate::ticker::{build_summary, Ticker};
use crate::tracker::{SessionContext, SessionTracker};

/// Bounded queue sizes from §5.
const OUTBOUND_CAPACITY: usize = 1000;

/// `SESSION_IDLE` alert per §4.7's forced idle rollover.
const ALERT_SESSION_IDLE: &str = "SESSION_IDLE";

/// How often the idle watcher polls for inactivity.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Everything a caller supplies to stand up one tail invocation. Target
/// resolution and producer-argument assembly happen upstream of this
/// struct (in `simtail-cli`); this is the pure pipeline boundary.
pub struct PipelineArgs<W: std::io::Write + Send + 'static> {
    pub config: Config,
    pub session_context: SessionContext,
    pub spawner: Box<dyn ProducerSpawner>,
    pub writer: W,
    pub id_gen: Box<dyn IdGen>,
    pub pattern_store: Option<Arc<dyn PatternStore>>,
}

#[derive(Default)]
struct PipelineStats {
    parse_drops: AtomicU64,
    timestamp_parse_drops: AtomicU64,
    channel_drops: AtomicU64,
}

/// Feeds `Parser`'s timestamp-error hook into `PipelineStats` so the
/// `timestamp_parse_drop every 100` threshold (§7) is observable without a
/// separate counter living only inside the parser.
struct StatsTimestampHook(Arc<PipelineStats>);

impl TimestampErrorHook for StatsTimestampHook {
    fn on_timestamp_error(&self, _raw: &str) {
        let drops = self.0.timestamp_parse_drops.fetch_add(1, Ordering::Relaxed) + 1;
        if drops % 100 == 0 {
            tracing::warn!(timestamp_parse_drops = drops, "timestamp_parse_drop threshold reached");
        }
    }
}

/// Collapses a run of identical messages into one `log` emission plus a
/// corrected re-emission carrying the final count once the run's length is
/// known. `GetPendingDuplicates` is described in §4.5 as feeding a
/// "periodic flush of collapsed summaries" — this flush point is the
/// summary tick (see DESIGN.md's Open Question entry for dedupe/ticker
/// coupling).
struct DedupeStage {
    filter: DedupeFilter,
    last_entry: HashMap<String, LogEntry>,
}

impl DedupeStage {
    fn new(mode: DedupeMode) -> Self {
        Self {
            filter: DedupeFilter::new(mode),
            last_entry: HashMap::new(),
        }
    }

    fn check(&mut self, entry: &LogEntry) -> bool {
        let result = self.filter.check(&entry.message, entry.timestamp);
        self.last_entry.insert(entry.message.clone(), entry.clone());
        result.should_emit
    }

    fn flush_pending(&self) -> Vec<LogEntry> {
        self.filter
            .get_pending_duplicates()
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .filter_map(|(message, count)| {
                self.last_entry.get(&message).map(|template| {
                    let mut e = template.clone();
                    e.dedupe_count = Some(count);
                    e
                })
            })
            .collect()
    }

    /// Per the Open Question decision in DESIGN.md: an idle rollover also
    /// flushes dedupe state, so a dormant message doesn't silently carry
    /// its count across a session boundary.
    fn reset(&mut self) {
        self.filter.reset();
        self.last_entry.clear();
    }
}

type SharedDedupe = Arc<Mutex<DedupeStage>>;

/// One end-to-end tail invocation: owns the supervisor, filter chain,
/// dedupe state, ring buffer, session tracker and emitter for its
/// lifetime (§3: "Ownership").
pub struct Pipeline<W: std::io::Write + Send + 'static> {
    tail_id: TailId,
    shutdown: Arc<Shutdown>,
    emitter: Arc<Emitter<W>>,
    ring_buffer: Arc<simtail_core::ring_buffer::SharedRingBuffer<LogEntry>>,
    tracker: Arc<SessionTracker>,
    ticker: Arc<Ticker>,
    stats: Arc<PipelineStats>,
    supervisor_stats: Mutex<Option<Arc<simtail_adapters::SupervisorStats>>>,
    last_entry_at: Arc<AtomicI64>,
    gap_start: Arc<Mutex<Option<Timestamp>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

/// Compiled/runtime pieces handed from `build` to `run`. Kept off
/// `Pipeline` itself so constructing the filter chain (which can fail)
/// happens before anything is spawned.
pub struct PipelineInit {
    config: Config,
    session_context: SessionContext,
    spawner: Box<dyn ProducerSpawner>,
    filter: FilterEngine,
    dedupe: Option<SharedDedupe>,
    clock: Arc<dyn Clock>,
    pattern_store: Option<Arc<dyn PatternStore>>,
}

impl<W: std::io::Write + Send + 'static> Pipeline<W> {
    /// Compiles the filter chain and constructs the pipeline. Returns
    /// `ConfigError` for an invalid where-expression or regex (§7); the
    /// caller is responsible for surfacing it as the single `error` event
    /// and a non-zero exit.
    pub fn build(args: PipelineArgs<W>) -> Result<(Self, PipelineInit), ConfigError> {
        let filter = FilterEngine::compile(&args.config)?;
        let tail_id = TailId::generate(args.id_gen.as_ref());

        let dedupe = args.config.dedupe_enabled.then(|| {
            let window_nanos = args
                .config
                .dedupe_window
                .map(|d| d.as_nanos() as i64)
                .unwrap_or(0);
            Arc::new(Mutex::new(DedupeStage::new(DedupeMode::from_window_nanos(
                window_nanos,
            ))))
        });

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let now = Timestamp::from_epoch_nanos(clock.now_nanos());

        let pipeline = Self {
            tail_id,
            shutdown: Arc::new(Shutdown::new()),
            emitter: Arc::new(Emitter::new(args.writer)),
            ring_buffer: Arc::new(simtail_core::ring_buffer::SharedRingBuffer::new(
                args.config.buffer_size,
            )),
            tracker: Arc::new(SessionTracker::new()),
            ticker: Arc::new(Ticker::new(now)),
            stats: Arc::new(PipelineStats::default()),
            supervisor_stats: Mutex::new(None),
            last_entry_at: Arc::new(AtomicI64::new(now.epoch_nanos)),
            gap_start: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        };

        let init = PipelineInit {
            config: args.config,
            session_context: args.session_context,
            spawner: args.spawner,
            filter,
            dedupe,
            clock,
            pattern_store: args.pattern_store,
        };

        Ok((pipeline, init))
    }

    pub fn tail_id(&self) -> &TailId {
        &self.tail_id
    }

    pub fn ring_buffer(&self) -> &Arc<simtail_core::ring_buffer::SharedRingBuffer<LogEntry>> {
        &self.ring_buffer
    }

    /// Starts every worker (§5): supervisor, entry-processing loop, the
    /// heartbeat/summary/stats ticker, and (if configured) the idle
    /// watcher. Emits `ready` before returning.
    pub fn run(&self, init: PipelineInit) {
        let PipelineInit {
            config,
            session_context,
            spawner,
            filter,
            dedupe,
            clock,
            pattern_store,
        } = init;

        let ready = OutputEvent::Ready(ReadyPayload {
            timestamp: format_timestamp(&Timestamp::from_epoch_nanos(clock.now_nanos())),
            simulator: session_context.simulator.clone(),
            udid: session_context.udid.clone(),
            app: session_context.app.clone(),
            tail_id: self.tail_id.clone(),
            session: 0,
            contract_version: CONTRACT_VERSION,
        });
        let _ = self.emitter.emit(&ready);
        let _ = self.emitter.emit(&OutputEvent::Metadata(metadata_payload()));

        let (supervisor_tx, supervisor_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let supervisor = ProducerSupervisor::new(spawner, self.shutdown.clone(), config.verbose);
        let supervisor_stats = supervisor.stats();
        *self.supervisor_stats.lock() = Some(supervisor_stats.clone());

        let handles = self.handles();
        let session_context_for_idle = session_context.clone();

        // Outbound log channel (§5): bounded, non-blocking. A full channel
        // means the emitter can't keep up; the entry is already in the ring
        // buffer (see `handle_line`), so the drop is observable-but-safe.
        let (log_tx, log_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(supervisor.run(supervisor_tx)));
        tasks.push(tokio::spawn(handles.clone().entry_loop(
            supervisor_rx,
            filter,
            dedupe.clone(),
            session_context,
            log_tx,
        )));
        tasks.push(tokio::spawn(handles.clone().emit_loop(log_rx)));
        tasks.push(tokio::spawn(handles.clone().ticker_loop(
            config.heartbeat_interval,
            config.summary_interval,
            clock.clone(),
            pattern_store,
            supervisor_stats,
            dedupe.clone(),
        )));
        if let Some(session_idle) = config.session_idle {
            let ctx_for_idle = session_context_for_idle.clone();
            tasks.push(tokio::spawn(handles.idle_loop(session_idle, clock, dedupe, ctx_for_idle)));
        }
    }

    fn handles(&self) -> PipelineHandles<W> {
        PipelineHandles {
            shutdown: self.shutdown.clone(),
            emitter: self.emitter.clone(),
            ring_buffer: self.ring_buffer.clone(),
            tracker: self.tracker.clone(),
            ticker: self.ticker.clone(),
            stats: self.stats.clone(),
            tail_id: self.tail_id.clone(),
            last_entry_at: self.last_entry_at.clone(),
            gap_start: self.gap_start.clone(),
        }
    }

    /// Idempotent (§5): cancels, and on the first call joins every worker
    /// and emits the final `session_end`. After it returns, no further
    /// events are emitted.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        let now = Timestamp::from_epoch_nanos(SystemClock.now_nanos());
        if let Some((session, summary)) = self.tracker.get_final_summary(now) {
            let event = OutputEvent::SessionEnd(SessionEndPayload {
                session: session.number,
                pid: session.pid,
                summary: SessionEndSummary {
                    total_logs: summary.total_logs,
                    errors: summary.errors,
                    faults: summary.faults,
                    duration_seconds: summary.duration_seconds,
                },
                tail_id: Some(self.tail_id.clone()),
            });
            let _ = self.emitter.emit(&event);
        }
    }
}

/// Cloned handles a worker task needs; `Pipeline` itself is never moved
/// into a task (it's owned by the caller, typically behind an `Arc`).
#[derive(Clone)]
struct PipelineHandles<W: std::io::Write + Send + 'static> {
    shutdown: Arc<Shutdown>,
    emitter: Arc<Emitter<W>>,
    ring_buffer: Arc<simtail_core::ring_buffer::SharedRingBuffer<LogEntry>>,
    tracker: Arc<SessionTracker>,
    ticker: Arc<Ticker>,
    stats: Arc<PipelineStats>,
    tail_id: TailId,
    last_entry_at: Arc<AtomicI64>,
    gap_start: Arc<Mutex<Option<Timestamp>>>,
}

impl<W: std::io::Write + Send + 'static> PipelineHandles<W> {
    async fn entry_loop(
        self,
        mut rx: mpsc::Receiver<SupervisorEvent>,
        filter: FilterEngine,
        dedupe: Option<SharedDedupe>,
        session_context: SessionContext,
        log_tx: mpsc::Sender<LogEntry>,
    ) {
        let parser = Parser::with_hook(SystemClock, Box::new(StatsTimestampHook(self.stats.clone())));

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        SupervisorEvent::Line(line) => {
                            self.handle_line(&line, &parser, &filter, &dedupe, &session_context, &log_tx);
                        }
                        SupervisorEvent::StderrLine(line) => {
                            tracing::debug!(stderr = %line, "producer stderr");
                        }
                        SupervisorEvent::ReconnectNotice { message, severity } => {
                            let severity_str = match severity {
                                Severity::Warn => "warn",
                                Severity::Error => "error",
                            };
                            let event = OutputEvent::ReconnectNotice(ReconnectNoticePayload {
                                message,
                                tail_id: self.tail_id.clone(),
                                severity: severity_str,
                            });
                            let _ = self.emitter.emit(&event);
                            self.emit_gap_detected();
                        }
                        SupervisorEvent::Stopped => break,
                    }
                }
            }
        }
    }

    /// Opens a gap at `last_entry_at` the first time a reconnect notice
    /// fires after a clean stretch (§1 pillar (e): "reconnect and gap
    /// notices"). A second notice before the gap closes doesn't re-open it.
    fn emit_gap_detected(&self) {
        let mut gap_start = self.gap_start.lock();
        if gap_start.is_some() {
            return;
        }
        let from = Timestamp::from_epoch_nanos(self.last_entry_at.load(Ordering::SeqCst));
        *gap_start = Some(from);
        drop(gap_start);

        let now = Timestamp::from_epoch_nanos(SystemClock.now_nanos());
        let event = OutputEvent::GapDetected(GapPayload {
            from_timestamp: format_timestamp(&from),
            to_timestamp: format_timestamp(&now),
            tail_id: self.tail_id.clone(),
            session: self.tracker.current_session_number(),
            backfilled_count: None,
        });
        let _ = self.emitter.emit(&event);
    }

    /// Closes a pending gap once the first post-reconnect entry survives
    /// parsing, filtering and dedupe. No-op if no gap is open.
    fn emit_gap_filled(&self, entry: &LogEntry) {
        let Some(from) = self.gap_start.lock().take() else {
            return;
        };
        let event = OutputEvent::GapFilled(GapPayload {
            from_timestamp: format_timestamp(&from),
            to_timestamp: format_timestamp(&entry.timestamp),
            tail_id: self.tail_id.clone(),
            session: entry.session,
            backfilled_count: None,
        });
        let _ = self.emitter.emit(&event);
    }

    fn handle_line(
        &self,
        line: &str,
        parser: &Parser<SystemClock>,
        filter: &FilterEngine,
        dedupe: &Option<SharedDedupe>,
        session_context: &SessionContext,
        log_tx: &mpsc::Sender<LogEntry>,
    ) {
        let entry = match parser.parse_line(line) {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(_) => {
                let drops = self.stats.parse_drops.fetch_add(1, Ordering::Relaxed) + 1;
                if drops % 500 == 0 {
                    tracing::warn!(parse_drops = drops, "parse_drop threshold reached");
                }
                return;
            }
        };

        if !filter.accept(&entry) {
            return;
        }

        let mut entry = entry;
        if let Some(stage) = dedupe {
            let should_emit = stage.lock().check(&entry);
            if !should_emit {
                return;
            }
        }
        entry.tail_id = Some(self.tail_id.clone());

        self.last_entry_at
            .store(entry.timestamp.epoch_nanos, Ordering::SeqCst);

        let transition = self.tracker.check_entry(&entry);
        self.apply_transition(transition, session_context);
        entry.session = self.tracker.current_session_number();
        self.emit_gap_filled(&entry);

        self.ring_buffer.push(entry.clone());

        // §5: the ring buffer already has the entry, so a dropped send here
        // only costs the live NDJSON stream, not the buffered snapshot.
        match log_tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.channel_drops.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Consumes the outbound log channel and performs the actual `log`
    /// emission, decoupling producer-side parsing from emitter writes
    /// (§5). Ends once `entry_loop` drops its sender.
    async fn emit_loop(self, mut rx: mpsc::Receiver<LogEntry>) {
        while let Some(entry) = rx.recv().await {
            self.ticker.record_delivered(&entry);
            self.emit_log(&entry);
        }
    }

    fn apply_transition(&self, transition: SessionTransition, ctx: &SessionContext) {
        match transition {
            SessionTransition::None => {}
            SessionTransition::Start { session } => {
                let event = OutputEvent::SessionStart(SessionStartPayload {
                    session: session.number,
                    pid: session.pid,
                    app: ctx.app.clone(),
                    simulator: ctx.simulator.clone(),
                    udid: ctx.udid.clone(),
                    timestamp: format_timestamp(&session.started_at),
                    alert: None,
                    previous_pid: None,
                    tail_id: Some(self.tail_id.clone()),
                    version: ctx.version.clone(),
                    build: ctx.build.clone(),
                    binary_uuid: session.binary_uuid.clone(),
                });
                let _ = self.emitter.emit(&event);
            }
            SessionTransition::Rollover { ended, ended_summary, started, alert } => {
                let end_event = OutputEvent::SessionEnd(SessionEndPayload {
                    session: ended.number,
                    pid: ended.pid,
                    summary: SessionEndSummary {
                        total_logs: ended_summary.total_logs,
                        errors: ended_summary.errors,
                        faults: ended_summary.faults,
                        duration_seconds: ended_summary.duration_seconds,
                    },
                    tail_id: Some(self.tail_id.clone()),
                });
                let _ = self.emitter.emit(&end_event);

                let clear = OutputEvent::ClearBuffer(ClearBufferPayload {
                    reason: "session_transition".to_string(),
                    tail_id: self.tail_id.clone(),
                    session: started.number,
                    hints: vec!["discard cached state scoped to the previous session".to_string()],
                });
                let _ = self.emitter.emit(&clear);

                let start_event = OutputEvent::SessionStart(SessionStartPayload {
                    session: started.number,
                    pid: started.pid,
                    app: ctx.app.clone(),
                    simulator: ctx.simulator.clone(),
                    udid: ctx.udid.clone(),
                    timestamp: format_timestamp(&started.started_at),
                    alert,
                    previous_pid: Some(ended.pid),
                    tail_id: Some(self.tail_id.clone()),
                    version: ctx.version.clone(),
                    build: ctx.build.clone(),
                    binary_uuid: started.binary_uuid.clone(),
                });
                let _ = self.emitter.emit(&start_event);
            }
        }
    }

    fn emit_log(&self, entry: &LogEntry) {
        let event = OutputEvent::Log(LogPayload {
            timestamp: format_timestamp(&entry.timestamp),
            level: entry.level,
            process: entry.process.clone(),
            pid: entry.pid,
            message: entry.message.clone(),
            subsystem: entry.subsystem.clone(),
            category: entry.category.clone(),
            session: (entry.session > 0).then_some(entry.session),
            tail_id: entry.tail_id.clone(),
            dedupe_count: entry.dedupe_count,
            dedupe_first: entry.dedupe_first.as_ref().map(format_timestamp),
            dedupe_last: entry.dedupe_last.as_ref().map(format_timestamp),
        });
        let _ = self.emitter.emit(&event);
    }

    #[allow(clippy::too_many_arguments)]
    async fn ticker_loop(
        self,
        heartbeat_interval: Duration,
        summary_interval: Duration,
        clock: Arc<dyn Clock>,
        pattern_store: Option<Arc<dyn PatternStore>>,
        supervisor_stats: Arc<simtail_adapters::SupervisorStats>,
        dedupe: Option<SharedDedupe>,
    ) {
        let mut heartbeat_tick = tokio::time::interval(heartbeat_interval);
        let mut summary_tick = tokio::time::interval(summary_interval);
        heartbeat_tick.tick().await;
        summary_tick.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = heartbeat_tick.tick() => {
                    let now = Timestamp::from_epoch_nanos(clock.now_nanos());
                    let session = self.tracker.current_session_number();
                    let hb = self.ticker.build_heartbeat(now, self.tail_id.clone(), session);
                    let last_seen_timestamp = hb.last_seen_timestamp.clone();
                    let _ = self.emitter.emit(&OutputEvent::Heartbeat(hb));

                    let stats = OutputEvent::Stats(StatsPayload {
                        timestamp: format_timestamp(&now),
                        tail_id: self.tail_id.clone(),
                        session,
                        reconnects: supervisor_stats.reconnects.load(Ordering::SeqCst),
                        parse_drops: self.stats.parse_drops.load(Ordering::Relaxed),
                        channel_drops: self.stats.channel_drops.load(Ordering::Relaxed),
                        buffered: self.ring_buffer.count(),
                        last_seen_timestamp,
                    });
                    let _ = self.emitter.emit(&stats);
                }
                _ = summary_tick.tick() => {
                    let now = Timestamp::from_epoch_nanos(clock.now_nanos());
                    let entries = self.ring_buffer.get_all();
                    let summary = build_summary(&entries, now, now);
                    let _ = self.emitter.emit(&OutputEvent::Summary(summary));

                    if let Some(store) = &pattern_store {
                        self.emit_analysis(store, &entries, now);
                    }

                    if let Some(stage) = &dedupe {
                        for entry in stage.lock().flush_pending() {
                            self.emit_log(&entry);
                        }
                    }
                }
            }
        }
    }

    fn emit_analysis(&self, store: &Arc<dyn PatternStore>, entries: &[LogEntry], now: Timestamp) {
        let summary = build_summary(entries, now, now);
        let mut new_count = 0u64;
        let mut known_count = 0u64;
        let mut patterns = Vec::new();
        for normalized in summary.top_errors.iter().chain(summary.top_faults.iter()) {
            if store.is_known(normalized) {
                known_count += 1;
            } else {
                new_count += 1;
            }
            store.record(normalized, 1, now.epoch_nanos);
            patterns.push(normalized.clone());
        }
        let event = OutputEvent::Analysis(crate::emitter::AnalysisPayload {
            timestamp: format_timestamp(&now),
            summary,
            patterns,
            new_pattern_count: new_count,
            known_pattern_count: known_count,
        });
        let _ = self.emitter.emit(&event);
    }

    async fn idle_loop(
        self,
        session_idle: Duration,
        clock: Arc<dyn Clock>,
        dedupe: Option<SharedDedupe>,
        session_context: SessionContext,
    ) {
        let idle_nanos = session_idle.as_nanos() as i64;
        let mut interval = tokio::time::interval(IDLE_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let now_nanos = clock.now_nanos();
                    let last = self.last_entry_at.load(Ordering::SeqCst);
                    if now_nanos - last <= idle_nanos {
                        continue;
                    }
                    let now = Timestamp::from_epoch_nanos(now_nanos);
                    if let Some(transition) = self.tracker.force_rollover(ALERT_SESSION_IDLE, now) {
                        self.apply_idle_rollover(transition, &session_context);
                        self.last_entry_at.store(now_nanos, Ordering::SeqCst);
                        if let Some(stage) = &dedupe {
                            stage.lock().reset();
                        }
                    }
                }
            }
        }
    }

    fn apply_idle_rollover(&self, transition: SessionTransition, ctx: &SessionContext) {
        let SessionTransition::Rollover { ended, ended_summary, started, alert } = transition else {
            return;
        };
        let end_event = OutputEvent::SessionEnd(SessionEndPayload {
            session: ended.number,
            pid: ended.pid,
            summary: SessionEndSummary {
                total_logs: ended_summary.total_logs,
                errors: ended_summary.errors,
                faults: ended_summary.faults,
                duration_seconds: ended_summary.duration_seconds,
            },
            tail_id: Some(self.tail_id.clone()),
        });
        let _ = self.emitter.emit(&end_event);

        let clear = OutputEvent::ClearBuffer(ClearBufferPayload {
            reason: "session_idle".to_string(),
            tail_id: self.tail_id.clone(),
            session: started.number,
            hints: vec!["discard cached state scoped to the previous session".to_string()],
        });
        let _ = self.emitter.emit(&clear);

        let start_event = OutputEvent::SessionStart(SessionStartPayload {
            session: started.number,
            pid: started.pid,
            app: ctx.app.clone(),
            simulator: ctx.simulator.clone(),
            udid: ctx.udid.clone(),
            timestamp: format_timestamp(&started.started_at),
            alert,
            previous_pid: Some(ended.pid),
            tail_id: Some(self.tail_id.clone()),
            version: ctx.version.clone(),
            build: ctx.build.clone(),
            binary_uuid: started.binary_uuid.clone(),
        });
        let _ = self.emitter.emit(&start_event);
    }
}
