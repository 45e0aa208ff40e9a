// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Producer Supervisor (§4.1): keeps one producer subprocess alive, hides
//! transient failures behind jittered exponential backoff, and exposes
//! stdout lines / stderr diagnostics / reconnect notices on channels.
//!
//! The stdout/stderr reading loop is grounded on the teacher's
//! `agent::watcher` shutdown-via-`tokio::select!` pattern; process
//! execution reuses `subprocess::run_with_timeout`'s sibling helpers.

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Notify};

use crate::target::TargetError;

/// Stdout lines over 1 MiB are a fatal producer error (§4.1, §7).
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Backoff starts at 1s, doubles, capped at 30s (§4.1).
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `jitter(d) = d * U(0.5, 1.5)` (§4.1).
fn jitter(d: Duration) -> Duration {
    let factor = rand::rng().random_range(0.5..1.5);
    Duration::from_secs_f64(d.as_secs_f64() * factor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Line(String),
    StderrLine(String),
    ReconnectNotice { message: String, severity: Severity },
    Stopped,
}

/// Cancellation shared between the supervisor loop and its owner, mirroring
/// the teacher's oneshot-shutdown pattern but reusable across reconnects.
#[derive(Default)]
pub struct Shutdown {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

/// One running producer child, abstracted so tests never spawn a real
/// process.
#[async_trait]
pub trait ProducerProcess: Send {
    async fn next_stdout_line(&mut self) -> io::Result<LineOutcome>;
    async fn next_stderr_line(&mut self) -> io::Result<Option<String>>;
    async fn wait(&mut self) -> io::Result<Option<i32>>;
    fn kill(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Line(String),
    TooLong,
    Eof,
}

/// Spawns producer processes. `CommandProducerSpawner` is the production
/// implementation; tests use `fake::FakeProducerSpawner`.
#[async_trait]
pub trait ProducerSpawner: Send + Sync {
    async fn spawn(&self) -> io::Result<Box<dyn ProducerProcess>>;
}

async fn read_capped_line<R: AsyncRead + Unpin + Send>(
    reader: &mut BufReader<R>,
) -> io::Result<LineOutcome> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(LineOutcome::Eof);
    }
    if buf.len() > MAX_LINE_BYTES {
        return Ok(LineOutcome::TooLong);
    }
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(LineOutcome::Line(String::from_utf8_lossy(&buf).into_owned()))
}

struct ChildProcess {
    child: Child,
    stdout: BufReader<tokio::process::ChildStdout>,
    stderr: BufReader<tokio::process::ChildStderr>,
}

#[async_trait]
impl ProducerProcess for ChildProcess {
    async fn next_stdout_line(&mut self) -> io::Result<LineOutcome> {
        read_capped_line(&mut self.stdout).await
    }

    async fn next_stderr_line(&mut self) -> io::Result<Option<String>> {
        match read_capped_line(&mut self.stderr).await? {
            LineOutcome::Line(s) => Ok(Some(s)),
            LineOutcome::TooLong => Ok(Some("<stderr line exceeded ceiling>".to_string())),
            LineOutcome::Eof => Ok(None),
        }
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.wait().await?.code())
    }

    fn kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Spawns the real producer binary (e.g. `xcrun simctl spawn ... log
/// stream`). `program`/`args` are built by the daemon's filter compiler
/// from the active configuration (§4.3).
pub struct CommandProducerSpawner {
    pub program: String,
    pub args: Vec<String>,
}

#[async_trait]
impl ProducerSpawner for CommandProducerSpawner {
    #[allow(clippy::expect_used)]
    async fn spawn(&self) -> io::Result<Box<dyn ProducerProcess>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn()?;
        let stdout = BufReader::new(child.stdout.take().expect("stdout piped"));
        let stderr = BufReader::new(child.stderr.take().expect("stderr piped"));
        Ok(Box::new(ChildProcess { child, stdout, stderr }))
    }
}

/// Observable counters, shared with `stats`/`heartbeat` emission in
/// `simtail-daemon` (§4.9, §8).
#[derive(Default)]
pub struct SupervisorStats {
    pub reconnects: AtomicU64,
    pub consecutive_failures: AtomicU32,
}

pub struct ProducerSupervisor {
    spawner: Box<dyn ProducerSpawner>,
    shutdown: Arc<Shutdown>,
    verbose: bool,
    stats: Arc<SupervisorStats>,
}

impl ProducerSupervisor {
    pub fn new(spawner: Box<dyn ProducerSpawner>, shutdown: Arc<Shutdown>, verbose: bool) -> Self {
        Self {
            spawner,
            shutdown,
            verbose,
            stats: Arc::new(SupervisorStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SupervisorStats> {
        self.stats.clone()
    }

    /// Drives the reconnect loop until cancelled. Consumes `self` because
    /// there is exactly one producer subprocess per pipeline (§1 non-goals).
    pub async fn run(self, tx: mpsc::Sender<SupervisorEvent>) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.spawner.spawn().await {
                Ok(mut process) => {
                    let attached = self.drive(&mut process, &tx).await;
                    if attached {
                        backoff = INITIAL_BACKOFF;
                        self.stats.consecutive_failures.store(0, Ordering::SeqCst);
                    }
                    if self.shutdown.is_cancelled() {
                        process.kill();
                        break;
                    }
                }
                Err(e) => {
                    self.note_failure(&tx, &format!("failed to spawn producer: {e}"), Severity::Warn)
                        .await;
                }
            }

            let wait = jitter(backoff);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown.cancelled() => break,
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        let _ = tx.send(SupervisorEvent::Stopped).await;
    }

    /// Reads one producer's lifetime to completion or cancellation. Returns
    /// whether at least one line was ever read (the "successful attach"
    /// that resets backoff, per §4.1 — this crate has no visibility into
    /// parse success, so attach is approximated as "producer spoke at all").
    async fn drive(
        &self,
        process: &mut Box<dyn ProducerProcess>,
        tx: &mpsc::Sender<SupervisorEvent>,
    ) -> bool {
        let mut attached = false;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return attached,
                line = process.next_stdout_line() => {
                    match line {
                        Ok(LineOutcome::Line(s)) => {
                            attached = true;
                            if tx.send(SupervisorEvent::Line(s)).await.is_err() {
                                return attached;
                            }
                        }
                        Ok(LineOutcome::TooLong) => {
                            process.kill();
                            // FatalRuntimeError (§7): line too long always
                            // surfaces as severity=error, bypassing the
                            // consecutive-failure suppression threshold.
                            self.note_failure(
                                tx,
                                "producer line exceeds 1 MiB, restarting",
                                Severity::Error,
                            )
                            .await;
                            return attached;
                        }
                        Ok(LineOutcome::Eof) => {
                            let code = process.wait().await.ok().flatten();
                            self.note_failure(
                                tx,
                                &format!("producer exited (code={code:?})"),
                                Severity::Warn,
                            )
                            .await;
                            return attached;
                        }
                        Err(e) => {
                            self.note_failure(
                                tx,
                                &format!("producer stdout error: {e}"),
                                Severity::Warn,
                            )
                            .await;
                            return attached;
                        }
                    }
                }
                stderr = process.next_stderr_line(), if self.verbose => {
                    if let Ok(Some(line)) = stderr {
                        let _ = tx.send(SupervisorEvent::StderrLine(line)).await;
                    }
                }
            }
        }
    }

    async fn note_failure(&self, tx: &mpsc::Sender<SupervisorEvent>, message: &str, severity: Severity) {
        self.stats.reconnects.fetch_add(1, Ordering::SeqCst);
        let failures = self.stats.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        // Consecutive-failure warnings are suppressed before the 3rd failure
        // unless verbose (§4.1); an error-severity notice (§7:
        // FatalRuntimeError) always surfaces regardless of the threshold.
        if severity == Severity::Error || failures >= 3 || self.verbose {
            let _ = tx
                .send(SupervisorEvent::ReconnectNotice {
                    message: message.to_string(),
                    severity,
                })
                .await;
        }
    }
}

/// Waits (polling every `BOOT_POLL_INTERVAL`, up to `BOOT_WAIT_TIMEOUT`) for
/// a device to reach the booted state, requesting a boot if needed (§4.1).
pub async fn ensure_device_ready(
    resolver: &dyn crate::target::TargetResolver,
    udid: &str,
) -> Result<(), TargetError> {
    use crate::subprocess::{BOOT_POLL_INTERVAL, BOOT_WAIT_TIMEOUT};

    resolver.ensure_booted(udid).await?;

    let deadline = tokio::time::Instant::now() + BOOT_WAIT_TIMEOUT;
    loop {
        let devices = resolver.list_devices().await?;
        if devices
            .iter()
            .any(|d| d.udid == udid && d.state.eq_ignore_ascii_case("booted"))
        {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(TargetError::CommandFailed(format!(
                "device {udid} did not boot within {:?}",
                BOOT_WAIT_TIMEOUT
            )));
        }
        tokio::time::sleep(BOOT_POLL_INTERVAL).await;
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! Scripted `ProducerProcess`/`ProducerSpawner` for supervisor tests.

    use std::collections::VecDeque;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub enum ScriptStep {
        Line(String),
        TooLong,
        Exit,
    }

    struct FakeProcess {
        steps: VecDeque<ScriptStep>,
    }

    #[async_trait]
    impl ProducerProcess for FakeProcess {
        async fn next_stdout_line(&mut self) -> io::Result<LineOutcome> {
            match self.steps.pop_front() {
                Some(ScriptStep::Line(s)) => Ok(LineOutcome::Line(s)),
                Some(ScriptStep::TooLong) => Ok(LineOutcome::TooLong),
                Some(ScriptStep::Exit) | None => Ok(LineOutcome::Eof),
            }
        }

        async fn next_stderr_line(&mut self) -> io::Result<Option<String>> {
            std::future::pending().await
        }

        async fn wait(&mut self) -> io::Result<Option<i32>> {
            Ok(Some(0))
        }

        fn kill(&mut self) {}
    }

    /// Spawns one scripted process per `spawn()` call, cycling through a
    /// fixed list of scripts (one per reconnect attempt; the last script
    /// repeats once exhausted).
    #[derive(Clone)]
    pub struct FakeProducerSpawner {
        scripts: Arc<Mutex<VecDeque<Vec<ScriptStep>>>>,
    }

    impl FakeProducerSpawner {
        pub fn new(scripts: Vec<Vec<ScriptStep>>) -> Self {
            Self {
                scripts: Arc::new(Mutex::new(scripts.into())),
            }
        }
    }

    #[async_trait]
    impl ProducerSpawner for FakeProducerSpawner {
        async fn spawn(&self) -> io::Result<Box<dyn ProducerProcess>> {
            let mut scripts = self.scripts.lock();
            let steps = if scripts.len() > 1 {
                scripts.pop_front().unwrap_or_default()
            } else {
                scripts.front().cloned().unwrap_or_default()
            };
            Ok(Box::new(FakeProcess {
                steps: steps.into(),
            }))
        }
    }
}
