// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional TOML config file (§6), merged under the CLI flags the user
//! actually passed. Loading/parsing the file is an `anyhow` concern — it
//! fails before the pipeline's own `ConfigError` taxonomy is ever
//! consulted; only the semantic validation that follows (durations,
//! target resolution) reports through that taxonomy.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use simtail_core::entry::Level;
use simtail_core::{Config, ConfigError};

use crate::cli_args::Cli;
use crate::duration::{duration_from_secs, parse_duration_arg};

/// Every field optional: a key missing from the file falls through to the
/// CLI value, then to `Config::default()`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub target: Option<String>,
    pub output: Option<PathBuf>,
    pub pattern_store: Option<PathBuf>,

    pub bundle_id: Option<String>,
    pub min_level: Option<Level>,
    pub max_level: Option<Level>,

    pub include_regex: Option<String>,
    #[serde(default)]
    pub exclude_regexes: Vec<String>,
    #[serde(default)]
    pub subsystems: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub processes: Vec<String>,
    #[serde(default)]
    pub exclude_subsystems: Vec<String>,
    #[serde(default)]
    pub where_clauses: Vec<String>,
    pub raw_predicate: Option<String>,

    pub buffer_size: Option<i64>,
    /// Seconds; unlike the CLI flags, there's no `30s`/`2m` suffix syntax here.
    pub heartbeat_interval: Option<f64>,
    pub summary_interval: Option<f64>,
    pub session_idle: Option<f64>,

    #[serde(default)]
    pub dedupe_enabled: bool,
    pub dedupe_window: Option<f64>,

    #[serde(default)]
    pub verbose: bool,
}

pub fn load_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file '{}'", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file '{}'", path.display()))
}

/// CLI flags always win; a repeatable field set on the CLI replaces the
/// file's list rather than appending to it.
pub fn merge_config(file: Option<&FileConfig>, cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(file) = file {
        if let Some(v) = file.min_level {
            config.min_level = v;
        }
        if let Some(v) = file.max_level {
            config.max_level = Some(v);
        }
        if let Some(v) = &file.include_regex {
            config.include_regex = Some(v.clone());
        }
        if !file.exclude_regexes.is_empty() {
            config.exclude_regexes = file.exclude_regexes.clone();
        }
        if !file.subsystems.is_empty() {
            config.subsystems = file.subsystems.clone();
        }
        if !file.categories.is_empty() {
            config.categories = file.categories.clone();
        }
        if !file.processes.is_empty() {
            config.processes = file.processes.clone();
        }
        if !file.exclude_subsystems.is_empty() {
            config.exclude_subsystems = file.exclude_subsystems.clone();
        }
        if !file.where_clauses.is_empty() {
            config.where_clauses = file.where_clauses.clone();
        }
        if let Some(v) = &file.bundle_id {
            config.bundle_id = Some(v.clone());
        }
        if let Some(v) = &file.raw_predicate {
            config.raw_predicate = Some(v.clone());
        }
        if let Some(v) = file.buffer_size {
            config.buffer_size = v;
        }
        if let Some(secs) = file.heartbeat_interval {
            config.heartbeat_interval = duration_from_secs(secs)?;
        }
        if let Some(secs) = file.summary_interval {
            config.summary_interval = duration_from_secs(secs)?;
        }
        if let Some(secs) = file.session_idle {
            config.session_idle = Some(duration_from_secs(secs)?);
        }
        config.dedupe_enabled = config.dedupe_enabled || file.dedupe_enabled;
        if let Some(secs) = file.dedupe_window {
            config.dedupe_window = Some(duration_from_secs(secs)?);
        }
        config.verbose = config.verbose || file.verbose;
    }

    if let Some(v) = cli.min_level {
        config.min_level = v;
    }
    if let Some(v) = cli.max_level {
        config.max_level = Some(v);
    }
    if let Some(v) = &cli.include_regex {
        config.include_regex = Some(v.clone());
    }
    if !cli.exclude_regexes.is_empty() {
        config.exclude_regexes = cli.exclude_regexes.clone();
    }
    if !cli.subsystems.is_empty() {
        config.subsystems = cli.subsystems.clone();
    }
    if !cli.categories.is_empty() {
        config.categories = cli.categories.clone();
    }
    if !cli.processes.is_empty() {
        config.processes = cli.processes.clone();
    }
    if !cli.exclude_subsystems.is_empty() {
        config.exclude_subsystems = cli.exclude_subsystems.clone();
    }
    if !cli.where_clauses.is_empty() {
        config.where_clauses = cli.where_clauses.clone();
    }
    if let Some(v) = &cli.bundle_id {
        config.bundle_id = Some(v.clone());
    }
    if let Some(v) = &cli.raw_predicate {
        config.raw_predicate = Some(v.clone());
    }
    if let Some(v) = cli.buffer_size {
        config.buffer_size = v;
    }
    if let Some(s) = &cli.heartbeat_interval {
        config.heartbeat_interval = parse_duration_arg(s)?;
    }
    if let Some(s) = &cli.summary_interval {
        config.summary_interval = parse_duration_arg(s)?;
    }
    if let Some(s) = &cli.session_idle {
        config.session_idle = Some(parse_duration_arg(s)?);
    }
    config.dedupe_enabled = config.dedupe_enabled || cli.dedupe_enabled;
    if let Some(s) = &cli.dedupe_window {
        config.dedupe_window = Some(parse_duration_arg(s)?);
    }
    config.verbose = config.verbose || cli.verbose;

    Ok(config)
}
