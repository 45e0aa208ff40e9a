// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filter Engine (§4.3): the static filter chain applied to every parsed
//! entry, plus the producer-side predicate compiler that reduces upstream
//! volume before anything reaches this chain.
//!
//! Compiled once per session (§9: "never in the hot path") from `Config`;
//! `FilterEngine::compile` is the only place regexes and the where-expr are
//! built, mirroring the where-expression module's own "parse once" rule.

use regex::Regex;
use simtail_core::entry::LogEntry;
use simtail_core::{ConfigError, Config, WhereExpr};

/// One compiled process-allow-list pattern (§4.3): `re:PATTERN`/`/PATTERN/`
/// for regex, a pattern containing `*`/`?`/`[` for glob, otherwise exact.
enum ProcessPattern {
    Regex(Regex),
    Glob(String),
    Exact(String),
}

impl ProcessPattern {
    fn compile(raw: &str) -> Result<Self, ConfigError> {
        let as_regex = |pattern: &str| {
            Regex::new(pattern)
                .map(ProcessPattern::Regex)
                .map_err(|e| ConfigError::InvalidRegex {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })
        };

        if let Some(pattern) = raw.strip_prefix("re:") {
            return as_regex(pattern);
        }
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            return as_regex(&raw[1..raw.len() - 1]);
        }
        if raw.contains(['*', '?', '[']) {
            return Ok(ProcessPattern::Glob(raw.to_string()));
        }
        Ok(ProcessPattern::Exact(raw.to_string()))
    }

    fn matches(&self, process: &str) -> bool {
        match self {
            ProcessPattern::Regex(re) => re.is_match(process),
            ProcessPattern::Glob(pattern) => glob_match(pattern, process),
            ProcessPattern::Exact(s) => s == process,
        }
    }
}

/// Minimal shell-style glob matcher supporting `*`, `?`, and `[...]`
/// character classes — the three meta-characters §4.3 names. There is no
/// crate precedent for this in the corpus, so it's hand-rolled the way
/// `simtail-core::entry` hand-rolls its own civil-date algorithm.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_from(&p, &t)
}

fn glob_match_from(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => {
            glob_match_from(&p[1..], t) || (!t.is_empty() && glob_match_from(p, &t[1..]))
        }
        Some('?') => !t.is_empty() && glob_match_from(&p[1..], &t[1..]),
        Some('[') => {
            let Some(close) = p.iter().position(|&c| c == ']') else {
                return !t.is_empty() && p[0] == t[0] && glob_match_from(&p[1..], &t[1..]);
            };
            if t.is_empty() {
                return false;
            }
            let class = &p[1..close];
            let (negate, class) = match class.first() {
                Some('!') | Some('^') => (true, &class[1..]),
                _ => (false, class),
            };
            let hit = char_in_class(class, t[0]);
            if hit != negate {
                glob_match_from(&p[close + 1..], &t[1..])
            } else {
                false
            }
        }
        Some(c) => !t.is_empty() && *c == t[0] && glob_match_from(&p[1..], &t[1..]),
    }
}

fn char_in_class(class: &[char], c: char) -> bool {
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == '-' {
            if class[i] <= c && c <= class[i + 2] {
                return true;
            }
            i += 3;
        } else {
            if class[i] == c {
                return true;
            }
            i += 1;
        }
    }
    false
}

/// Subsystem exclude entries support an exact match or a trailing-`*`
/// prefix wildcard (§4.3).
fn subsystem_excluded(excludes: &[String], subsystem: &str) -> bool {
    excludes.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => subsystem.starts_with(prefix),
        None => pattern == subsystem,
    })
}

/// The compiled static filter chain (§4.3). Built once per session.
pub struct FilterEngine {
    min_level: simtail_core::entry::Level,
    max_level: Option<simtail_core::entry::Level>,
    include_regex: Option<Regex>,
    exclude_regexes: Vec<Regex>,
    exclude_subsystems: Vec<String>,
    process_patterns: Vec<ProcessPattern>,
    where_expr: Option<WhereExpr>,
}

impl FilterEngine {
    /// Compiles the filter chain from `Config`. Returns `ConfigError` for any
    /// invalid regex or where-expression (§7).
    pub fn compile(config: &Config) -> Result<Self, ConfigError> {
        let include_regex = config
            .include_regex
            .as_deref()
            .map(compile_regex)
            .transpose()?;

        let exclude_regexes = config
            .exclude_regexes
            .iter()
            .map(|p| compile_regex(p))
            .collect::<Result<Vec<_>, _>>()?;

        let process_patterns = config
            .processes
            .iter()
            .map(|p| ProcessPattern::compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        let where_expr = WhereExpr::parse_clauses(&config.where_clauses).map_err(|e| {
            ConfigError::InvalidWhereExpr {
                position: e.position,
                message: e.message,
            }
        })?;

        Ok(Self {
            min_level: config.min_level,
            max_level: config.max_level,
            include_regex,
            exclude_regexes,
            exclude_subsystems: config.exclude_subsystems.clone(),
            process_patterns,
            where_expr,
        })
    }

    /// Evaluates the chain in the exact order of §4.3, short-circuiting on
    /// first rejection.
    pub fn accept(&self, entry: &LogEntry) -> bool {
        let priority = entry.level.priority();
        if priority < self.min_level.priority() {
            return false;
        }
        if let Some(max) = self.max_level {
            if priority > max.priority() {
                return false;
            }
        }

        if let Some(re) = &self.include_regex {
            if !re.is_match(&entry.message) {
                return false;
            }
        }

        if self.exclude_regexes.iter().any(|re| re.is_match(&entry.message)) {
            return false;
        }

        if let Some(subsystem) = entry.subsystem.as_deref() {
            if subsystem_excluded(&self.exclude_subsystems, subsystem) {
                return false;
            }
        }

        if !self.process_patterns.is_empty()
            && !self.process_patterns.iter().any(|p| p.matches(&entry.process))
        {
            return false;
        }

        if let Some(expr) = &self.where_expr {
            if !expr.eval(entry) {
                return false;
            }
        }

        true
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Compiles the vendor-specific producer-side predicate string (§4.3) that
/// reduces upstream volume before the filter chain ever sees a line.
pub fn compile_predicate(config: &Config) -> Option<String> {
    if let Some(raw) = &config.raw_predicate {
        return Some(raw.clone());
    }

    let mut subsystem_terms = Vec::new();
    if let Some(bundle_id) = &config.bundle_id {
        subsystem_terms.push(format!("subsystem BEGINSWITH {}", quote(bundle_id)));
    }
    for sub in &config.subsystems {
        subsystem_terms.push(format!("subsystem == {}", quote(sub)));
    }

    let category_terms: Vec<String> = config
        .categories
        .iter()
        .map(|c| format!("category == {}", quote(c)))
        .collect();

    let groups: Vec<String> = [subsystem_terms, category_terms]
        .into_iter()
        .filter(|terms| !terms.is_empty())
        .map(|terms| group(&terms))
        .collect();

    if groups.is_empty() {
        None
    } else {
        Some(groups.join(" AND "))
    }
}

/// Single-element groups are not parenthesized; multi-element groups are
/// (§4.3).
fn group(terms: &[String]) -> String {
    if terms.len() == 1 {
        terms[0].clone()
    } else {
        format!("({})", terms.join(" OR "))
    }
}

/// Quotes a literal for the producer predicate syntax: `"` → `\"`, `\` →
/// `\\`, CR/LF/TAB escaped (§4.3).
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtail_core::entry::Level;
    use simtail_core::test_support::log_entry;

    #[test]
    fn s1_where_and_regex_combined() {
        let mut config = Config {
            include_regex: Some("error|timeout".to_string()),
            exclude_regexes: vec!["heartbeat".to_string()],
            where_clauses: vec![
                "(level = error OR level = fault) AND message~/timeout|crash/i".to_string(),
            ],
            ..Config::default()
        };
        config.min_level = Level::Debug;
        let engine = FilterEngine::compile(&config).unwrap();

        let e1 = log_entry(Level::Error, "Connection timeout occurred", 120);
        let e2 = log_entry(Level::Info, "heartbeat ping", 120);
        let e3 = log_entry(Level::Fault, "nil pointer", 120);

        assert!(engine.accept(&e1));
        assert!(!engine.accept(&e2));
        assert!(!engine.accept(&e3));
    }

    #[test]
    fn level_floor_and_ceiling_bound_the_range() {
        let config = Config {
            min_level: Level::Info,
            max_level: Some(Level::Error),
            ..Config::default()
        };
        let engine = FilterEngine::compile(&config).unwrap();
        assert!(!engine.accept(&log_entry(Level::Debug, "x", 1)));
        assert!(engine.accept(&log_entry(Level::Info, "x", 1)));
        assert!(engine.accept(&log_entry(Level::Error, "x", 1)));
        assert!(!engine.accept(&log_entry(Level::Fault, "x", 1)));
    }

    #[yare::parameterized(
        debug_passes_debug_floor = { Level::Debug, Level::Debug, true },
        info_passes_debug_floor = { Level::Debug, Level::Info, true },
        debug_blocked_by_info_floor = { Level::Info, Level::Debug, false },
        error_passes_info_floor = { Level::Info, Level::Error, true },
        fault_passes_error_floor = { Level::Error, Level::Fault, true },
        info_blocked_by_error_floor = { Level::Error, Level::Info, false },
    )]
    fn min_level_floor_matrix(min_level: Level, entry_level: Level, expected: bool) {
        let config = Config {
            min_level,
            ..Config::default()
        };
        let engine = FilterEngine::compile(&config).unwrap();
        assert_eq!(engine.accept(&log_entry(entry_level, "x", 1)), expected);
    }

    #[test]
    fn subsystem_exclude_supports_trailing_wildcard() {
        let config = Config {
            exclude_subsystems: vec!["com.apple.*".to_string()],
            ..Config::default()
        };
        let engine = FilterEngine::compile(&config).unwrap();
        let mut e = log_entry(Level::Info, "x", 1);
        e.subsystem = Some("com.apple.network".to_string());
        assert!(!engine.accept(&e));
        e.subsystem = Some("com.example.app".to_string());
        assert!(engine.accept(&e));
    }

    #[test]
    fn empty_process_allow_list_disables_the_filter() {
        let config = Config::default();
        let engine = FilterEngine::compile(&config).unwrap();
        assert!(engine.accept(&log_entry(Level::Info, "x", 1)));
    }

    #[test]
    fn process_allow_list_supports_exact_glob_and_regex_syntax() {
        let config = Config {
            processes: vec!["App".to_string(), "Helper*".to_string(), "re:^Worker\\d+$".to_string()],
            ..Config::default()
        };
        let engine = FilterEngine::compile(&config).unwrap();

        let named = |name: &str| {
            let mut e = log_entry(Level::Info, "x", 1);
            e.process = name.to_string();
            e
        };
        assert!(engine.accept(&named("App")));
        assert!(engine.accept(&named("HelperTool")));
        assert!(engine.accept(&named("Worker42")));
        assert!(!engine.accept(&named("Unrelated")));
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        let config = Config {
            include_regex: Some("(".to_string()),
            ..Config::default()
        };
        assert!(FilterEngine::compile(&config).is_err());
    }

    #[test]
    fn invalid_where_expr_is_a_config_error() {
        let config = Config {
            where_clauses: vec!["bogus field = 1".to_string()],
            ..Config::default()
        };
        assert!(matches!(
            FilterEngine::compile(&config),
            Err(ConfigError::InvalidWhereExpr { .. })
        ));
    }

    #[test]
    fn s4_predicate_assembly() {
        let config = Config {
            bundle_id: Some("com.example.app".to_string()),
            subsystems: vec!["com.apple.network".to_string()],
            categories: vec!["networking".to_string(), "security".to_string()],
            ..Config::default()
        };
        let predicate = compile_predicate(&config).unwrap();
        assert_eq!(
            predicate,
            "(subsystem BEGINSWITH \"com.example.app\" OR subsystem == \"com.apple.network\") AND (category == \"networking\" OR category == \"security\")"
        );
    }

    #[test]
    fn predicate_single_element_groups_are_not_parenthesized() {
        let config = Config {
            bundle_id: Some("com.example.app".to_string()),
            ..Config::default()
        };
        let predicate = compile_predicate(&config).unwrap();
        assert_eq!(predicate, "subsystem BEGINSWITH \"com.example.app\"");
    }

    #[test]
    fn raw_predicate_override_passes_through_unchanged() {
        let config = Config {
            raw_predicate: Some("subsystem == \"literally anything\"".to_string()),
            bundle_id: Some("ignored".to_string()),
            ..Config::default()
        };
        assert_eq!(
            compile_predicate(&config).as_deref(),
            Some("subsystem == \"literally anything\"")
        );
    }

    #[test]
    fn predicate_is_none_when_nothing_configured() {
        assert_eq!(compile_predicate(&Config::default()), None);
    }

    #[test]
    fn quote_escapes_special_characters() {
        let config = Config {
            subsystems: vec!["has \"quotes\" and \\backslash\\".to_string()],
            ..Config::default()
        };
        let predicate = compile_predicate(&config).unwrap();
        assert!(predicate.contains("\\\"quotes\\\""));
        assert!(predicate.contains("\\\\backslash\\\\"));
    }

    #[test]
    fn glob_match_supports_star_question_and_class() {
        assert!(glob_match("Helper*", "HelperTool"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("[a-c]at", "bat"));
        assert!(!glob_match("[!a-c]at", "bat"));
        assert!(glob_match("[!a-c]at", "zat"));
    }
}
