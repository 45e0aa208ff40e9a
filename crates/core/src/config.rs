// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The configuration surface consumed by the core pipeline (§6). Loading it
//! from a file or CLI flags is the job of `simtail-cli`; this struct is
//! just the agreed-upon shape, with the same defaults the original
//! describes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entry::Level;

fn default_min_level() -> Level {
    Level::Debug
}

fn default_buffer_size() -> i64 {
    100
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_summary_interval() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_min_level")]
    pub min_level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_level: Option<Level>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
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

    /// AND-joined when more than one clause is supplied (§4.4).
    #[serde(default)]
    pub where_clauses: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_predicate: Option<String>,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: i64,

    #[serde(default = "default_heartbeat_interval", with = "duration_secs")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_summary_interval", with = "duration_secs")]
    pub summary_interval: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_idle: Option<Duration>,

    #[serde(default)]
    pub dedupe_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_window: Option<Duration>,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_level: default_min_level(),
            max_level: None,
            include_regex: None,
            exclude_regexes: Vec::new(),
            subsystems: Vec::new(),
            categories: Vec::new(),
            processes: Vec::new(),
            exclude_subsystems: Vec::new(),
            where_clauses: Vec::new(),
            bundle_id: None,
            raw_predicate: None,
            buffer_size: default_buffer_size(),
            heartbeat_interval: default_heartbeat_interval(),
            summary_interval: default_summary_interval(),
            session_idle: None,
            dedupe_enabled: false,
            dedupe_window: None,
            verbose: false,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
