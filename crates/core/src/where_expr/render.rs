// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Renders a parsed where-expression back to source text (§8: `render()`
//! must round-trip semantically through `parse()`).

use super::ast::{WhereExpr, WhereField, WhereOp, WhereValue};

pub fn render(expr: &WhereExpr) -> String {
    match expr {
        WhereExpr::And(lhs, rhs) => format!("({}) AND ({})", render(lhs), render(rhs)),
        WhereExpr::Or(lhs, rhs) => format!("({}) OR ({})", render(lhs), render(rhs)),
        WhereExpr::Not(inner) => format!("NOT ({})", render(inner)),
        WhereExpr::Comparison { field, op, value } => {
            format!("{} {} {}", render_field(*field), op.symbol(), render_value(value))
        }
    }
}

fn render_field(field: WhereField) -> &'static str {
    field.name()
}

fn render_value(value: &WhereValue) -> String {
    match value {
        WhereValue::Str(s) => render_quoted(s),
        WhereValue::Num(n) => n.to_string(),
        WhereValue::Regex { pattern, flags, .. } => format!("/{pattern}/{flags}"),
    }
}

fn render_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
