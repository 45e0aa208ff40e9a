//! End-to-end scenario specifications, driving the whole `Pipeline` (parser
//! through emitter) from raw NDJSON producer lines rather than from
//! constructed `LogEntry` values. Complements the module-level unit tests,
//! which cover the same S1-S6 scenarios in isolation one layer at a time.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod prelude;

use std::time::Duration;

use prelude::{test_session_context, wait_for_at_least, SharedBuf};
use simtail_adapters::test_support::{FakeProducerSpawner, ScriptStep};
use simtail_core::id::SequentialIdGen;
use simtail_core::Config;
use simtail_daemon::{Pipeline, PipelineArgs};

fn line(timestamp: &str, level: &str, message: &str, pid: i64) -> String {
    format!(
        r#"{{"timestamp":"{timestamp}","eventType":"logEvent","messageType":"{level}","eventMessage":"{message}","processID":{pid}}}"#
    )
}

#[tokio::test]
async fn s1_where_and_regex_combined_through_the_full_pipeline() {
    let lines = vec![
        line("2026-01-01 00:00:00+0000", "Error", "Connection timeout occurred", 120),
        line("2026-01-01 00:00:01+0000", "Info", "heartbeat ping", 120),
        line("2026-01-01 00:00:02+0000", "Fault", "nil pointer", 120),
    ];
    let spawner = FakeProducerSpawner::new(vec![lines.into_iter().map(ScriptStep::Line).collect()]);
    let buf = SharedBuf::default();

    let mut config = Config::default();
    config.include_regex = Some("error|timeout".to_string());
    config.exclude_regexes = vec!["heartbeat".to_string()];
    config
        .where_clauses
        .push(r#"(level = error OR level = fault) AND message ~ /timeout|crash/i"#.to_string());

    let args = PipelineArgs {
        config,
        session_context: test_session_context(),
        spawner: Box::new(spawner),
        writer: buf.clone(),
        id_gen: Box::new(SequentialIdGen::new("t")),
        pattern_store: None,
    };
    let (pipeline, init) = Pipeline::build(args).expect("build");
    pipeline.run(init);

    wait_for_at_least(&buf, 4).await;
    pipeline.stop().await;

    let events = buf.events();
    let logs: Vec<&serde_json::Value> = events.iter().filter(|e| e["type"] == "log").collect();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["message"], "Connection timeout occurred");
}

#[tokio::test]
async fn s2_session_change_on_pid_through_the_full_pipeline() {
    let lines = vec![
        line("2026-01-01 00:00:00+0000", "Default", "first", 12345),
        line("2026-01-01 00:00:01+0000", "Error", "second", 12345),
        line("2026-01-01 00:00:02+0000", "Default", "third", 67890),
    ];
    let spawner = FakeProducerSpawner::new(vec![lines.into_iter().map(ScriptStep::Line).collect()]);
    let buf = SharedBuf::default();

    let args = PipelineArgs {
        config: Config::default(),
        session_context: test_session_context(),
        spawner: Box::new(spawner),
        writer: buf.clone(),
        id_gen: Box::new(SequentialIdGen::new("t")),
        pattern_store: None,
    };
    let (pipeline, init) = Pipeline::build(args).expect("build");
    pipeline.run(init);

    // ready, metadata, session_start(1), log, log, session_end(1), clear_buffer,
    // session_start(2), log
    wait_for_at_least(&buf, 9).await;
    pipeline.stop().await;

    let events = buf.events();
    let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();

    let first_start = types.iter().position(|t| *t == "session_start").unwrap();
    assert_eq!(events[first_start]["session"], 1);
    assert_eq!(events[first_start]["pid"], 12345);
    assert!(events[first_start]["alert"].is_null());

    let end_idx = types.iter().position(|t| *t == "session_end").unwrap();
    assert_eq!(events[end_idx]["session"], 1);
    assert_eq!(events[end_idx]["summary"]["total_logs"], 2);
    assert_eq!(events[end_idx]["summary"]["errors"], 1);

    let second_start = types
        .iter()
        .enumerate()
        .filter(|(_, t)| **t == "session_start")
        .nth(1)
        .unwrap()
        .0;
    assert!(end_idx < second_start);
    assert_eq!(events[second_start]["session"], 2);
    assert_eq!(events[second_start]["previous_pid"], 12345);
    assert_eq!(events[second_start]["alert"], "APP_RELAUNCHED");
}

#[tokio::test]
async fn s3_windowed_dedupe_through_the_full_pipeline() {
    let lines = vec![
        line("2026-01-01 00:00:00+0000", "Default", "repeat", 1),
        line("2026-01-01 00:00:03+0000", "Default", "repeat", 1),
        line("2026-01-01 00:00:10+0000", "Default", "repeat", 1),
    ];
    let spawner = FakeProducerSpawner::new(vec![lines.into_iter().map(ScriptStep::Line).collect()]);
    let buf = SharedBuf::default();

    let mut config = Config::default();
    config.dedupe_enabled = true;
    config.dedupe_window = Some(Duration::from_secs(5));

    let args = PipelineArgs {
        config,
        session_context: test_session_context(),
        spawner: Box::new(spawner),
        writer: buf.clone(),
        id_gen: Box::new(SequentialIdGen::new("t")),
        pattern_store: None,
    };
    let (pipeline, init) = Pipeline::build(args).expect("build");
    pipeline.run(init);

    // ready, metadata, session_start, log(0s), log(10s) — the 3s repeat is suppressed.
    wait_for_at_least(&buf, 5).await;
    pipeline.stop().await;

    let events = buf.events();
    let logs: Vec<&serde_json::Value> = events.iter().filter(|e| e["type"] == "log").collect();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["timestamp"], "2026-01-01T00:00:00.000000000+00:00");
    assert_eq!(logs[1]["timestamp"], "2026-01-01T00:00:10.000000000+00:00");
}

#[tokio::test]
async fn s5_reconnect_notice_reaches_the_emitted_stream() {
    let spawner = FakeProducerSpawner::new(vec![
        vec![ScriptStep::Exit],
        vec![ScriptStep::Line(line(
            "2026-01-01 00:00:00+0000",
            "Default",
            "attached",
            1,
        ))],
    ]);
    let buf = SharedBuf::default();

    let args = PipelineArgs {
        config: Config::default(),
        session_context: test_session_context(),
        spawner: Box::new(spawner),
        writer: buf.clone(),
        id_gen: Box::new(SequentialIdGen::new("t")),
        pattern_store: None,
    };
    let (pipeline, init) = Pipeline::build(args).expect("build");
    pipeline.run(init);

    let mut saw_notice = false;
    for _ in 0..200 {
        if buf
            .events()
            .iter()
            .any(|e| e["type"] == "reconnect_notice")
        {
            saw_notice = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    pipeline.stop().await;
    assert!(saw_notice, "expected a reconnect_notice after the first attempt exited");
}
