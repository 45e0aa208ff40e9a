// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evaluation of a parsed where-expression against a `LogEntry` (§4.4).
//!
//! Total and panic-free: field/operator combinations the spec marks "n/a"
//! (e.g. a regex operator against `pid`) evaluate to `false` rather than
//! erroring, since `eval` has no channel to report a runtime error through.

use super::ast::{WhereExpr, WhereField, WhereOp, WhereValue};
use crate::entry::LogEntry;

pub fn eval(expr: &WhereExpr, entry: &LogEntry) -> bool {
    match expr {
        WhereExpr::And(lhs, rhs) => eval(lhs, entry) && eval(rhs, entry),
        WhereExpr::Or(lhs, rhs) => eval(lhs, entry) || eval(rhs, entry),
        WhereExpr::Not(inner) => !eval(inner, entry),
        WhereExpr::Comparison { field, op, value } => eval_comparison(*field, *op, value, entry),
    }
}

fn eval_comparison(field: WhereField, op: WhereOp, value: &WhereValue, entry: &LogEntry) -> bool {
    match field {
        WhereField::Level => eval_str_or_ord(op, value, entry.level.to_string().as_str(), |s| {
            s.parse::<crate::entry::Level>()
                .ok()
                .map(|l| entry.level.cmp(&l))
        }),
        WhereField::Subsystem => eval_string(op, value, entry.subsystem.as_deref().unwrap_or("")),
        WhereField::Category => eval_string(op, value, entry.category.as_deref().unwrap_or("")),
        WhereField::Process => eval_string(op, value, &entry.process),
        WhereField::Message => eval_string(op, value, &entry.message),
        WhereField::Pid => eval_num(op, value, entry.pid as i64),
        WhereField::Tid => eval_num(op, value, entry.tid),
    }
}

fn eval_string(op: WhereOp, value: &WhereValue, field: &str) -> bool {
    match op {
        WhereOp::Eq => value.as_str().is_some_and(|v| field.eq_ignore_ascii_case(v)),
        WhereOp::Ne => value.as_str().is_some_and(|v| !field.eq_ignore_ascii_case(v)),
        WhereOp::RegexContains => value.as_regex().is_some_and(|re| re.is_match(field)),
        WhereOp::RegexNotContains => value.as_regex().is_some_and(|re| !re.is_match(field)),
        WhereOp::BeginsWith => value
            .as_str()
            .is_some_and(|v| field.to_ascii_lowercase().starts_with(&v.to_ascii_lowercase())),
        WhereOp::EndsWith => value
            .as_str()
            .is_some_and(|v| field.to_ascii_lowercase().ends_with(&v.to_ascii_lowercase())),
        WhereOp::Ge | WhereOp::Le => false,
    }
}

fn eval_num(op: WhereOp, value: &WhereValue, field: i64) -> bool {
    match op {
        WhereOp::Eq => value.as_num().is_some_and(|v| field == v),
        WhereOp::Ne => value.as_num().is_some_and(|v| field != v),
        WhereOp::Ge => value.as_num().is_some_and(|v| field >= v),
        WhereOp::Le => value.as_num().is_some_and(|v| field <= v),
        WhereOp::RegexContains
        | WhereOp::RegexNotContains
        | WhereOp::BeginsWith
        | WhereOp::EndsWith => false,
    }
}

/// `level` accepts both equality-by-name and ordered comparison (`>=`/`<=`)
/// against the priority order (§4.4), on top of the regular string operators.
fn eval_str_or_ord(
    op: WhereOp,
    value: &WhereValue,
    field: &str,
    ord: impl Fn(&str) -> Option<std::cmp::Ordering>,
) -> bool {
    match op {
        WhereOp::Ge => value
            .as_str()
            .and_then(|v| ord(v))
            .is_some_and(|o| o != std::cmp::Ordering::Less),
        WhereOp::Le => value
            .as_str()
            .and_then(|v| ord(v))
            .is_some_and(|o| o != std::cmp::Ordering::Greater),
        _ => eval_string(op, value, field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Level, Timestamp};

    fn entry(level: Level, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Timestamp::from_epoch_nanos(0),
            level,
            process: "App".to_string(),
            pid: 100,
            tid: 7,
            subsystem: Some("com.example.app".to_string()),
            category: Some("network".to_string()),
            message: message.to_string(),
            process_path: None,
            process_image_uuid: None,
            sender_path: None,
            event_type: None,
            session: 1,
            tail_id: None,
            dedupe_count: None,
            dedupe_first: None,
            dedupe_last: None,
        }
    }

    #[test]
    fn level_ordering_respects_priority() {
        let expr = super::super::parser::parse("level >= error").unwrap();
        assert!(eval(&expr, &entry(Level::Fault, "x")));
        assert!(eval(&expr, &entry(Level::Error, "x")));
        assert!(!eval(&expr, &entry(Level::Info, "x")));
    }

    #[test]
    fn begins_with_and_ends_with_are_case_insensitive() {
        let expr = super::super::parser::parse("subsystem ^ \"COM.example\"").unwrap();
        assert!(eval(&expr, &entry(Level::Info, "x")));
    }

    #[test]
    fn regex_op_against_numeric_field_is_false_not_a_panic() {
        let expr = super::super::parser::parse("pid ~ /1/").unwrap();
        assert!(!eval(&expr, &entry(Level::Info, "x")));
    }

    #[test]
    fn not_negates() {
        let expr = super::super::parser::parse("NOT level = debug").unwrap();
        assert!(eval(&expr, &entry(Level::Info, "x")));
    }
}
