// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line surface (§6). Every flag here mirrors a `Config` field or a
//! target/output concern that sits above `Config`; `config_file::merge_config`
//! is where the two combine.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use simtail_core::entry::Level;

fn parse_level(s: &str) -> Result<Level, String> {
    Level::from_str(s).map_err(|e| e.to_string())
}

/// Tails a running simulator's unified-logging stream, emitting a stable
/// NDJSON event contract on stdout (or `--output`).
#[derive(Parser, Debug)]
#[command(name = "simtail", version, about = "Tail a simulator's log stream as structured NDJSON events")]
pub struct Cli {
    /// Simulator name or UDID to attach to; defaults to the single booted device.
    #[arg(short = 't', long = "target")]
    pub target: Option<String>,

    /// App bundle identifier; scopes the producer predicate and tags session_start events.
    #[arg(short = 'b', long = "bundle-id")]
    pub bundle_id: Option<String>,

    /// Optional TOML config file; CLI flags override its values.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the NDJSON event stream here instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// JSONL file backing the pattern-novelty store used by `analysis` events; omit for an in-memory store.
    #[arg(long = "pattern-store", value_name = "PATH")]
    pub pattern_store: Option<PathBuf>,

    #[arg(long = "min-level", value_parser = parse_level, value_name = "LEVEL")]
    pub min_level: Option<Level>,
    #[arg(long = "max-level", value_parser = parse_level, value_name = "LEVEL")]
    pub max_level: Option<Level>,

    #[arg(long = "include", value_name = "REGEX")]
    pub include_regex: Option<String>,
    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude_regexes: Vec<String>,

    #[arg(long = "subsystem")]
    pub subsystems: Vec<String>,
    #[arg(long = "category")]
    pub categories: Vec<String>,
    #[arg(long = "process")]
    pub processes: Vec<String>,
    #[arg(long = "exclude-subsystem")]
    pub exclude_subsystems: Vec<String>,
    /// Boolean where-expression (§4.4); repeatable clauses are AND-joined.
    #[arg(long = "where", value_name = "EXPR")]
    pub where_clauses: Vec<String>,
    /// Bypasses subsystem/category assembly and sends this predicate straight to the producer (§4.3).
    #[arg(long = "raw-predicate")]
    pub raw_predicate: Option<String>,

    #[arg(long = "buffer-size", value_name = "N")]
    pub buffer_size: Option<i64>,
    #[arg(long = "heartbeat-interval", value_name = "DURATION")]
    pub heartbeat_interval: Option<String>,
    #[arg(long = "summary-interval", value_name = "DURATION")]
    pub summary_interval: Option<String>,
    /// Roll over the current session after this much silence (§4.7).
    #[arg(long = "session-idle", value_name = "DURATION")]
    pub session_idle: Option<String>,

    #[arg(long = "dedupe")]
    pub dedupe_enabled: bool,
    #[arg(long = "dedupe-window", value_name = "DURATION")]
    pub dedupe_window: Option<String>,

    /// Surfaces reconnect warnings before the third consecutive failure (§4.1).
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
