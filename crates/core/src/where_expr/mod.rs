// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Where-Expression Language (§4.4): a small boolean grammar over
//! `LogEntry` fields, used both as the core's own post-filter predicate
//! and (after producer-side compilation, in `simtail-daemon::filter`) to
//! reduce upstream volume.

mod ast;
mod eval;
mod lexer;
mod parser;
mod render;

pub use ast::{WhereExpr, WhereField, WhereOp, WhereValue};
pub use parser::WhereExprError;

use crate::entry::LogEntry;

impl WhereExpr {
    /// Parses one clause. Position in any resulting error is 1-based.
    pub fn parse(source: &str) -> Result<WhereExpr, WhereExprError> {
        parser::parse(source)
    }

    /// Parses and AND-joins zero or more clauses (§4.4: "AND-joined when
    /// multiple are supplied"). Returns `None` for an empty clause list.
    pub fn parse_clauses(clauses: &[String]) -> Result<Option<WhereExpr>, WhereExprError> {
        let mut iter = clauses.iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut expr = WhereExpr::parse(first)?;
        for clause in iter {
            expr = WhereExpr::And(Box::new(expr), Box::new(WhereExpr::parse(clause)?));
        }
        Ok(Some(expr))
    }

    /// Pure, total evaluation against one entry.
    pub fn eval(&self, entry: &LogEntry) -> bool {
        eval::eval(self, entry)
    }

    /// Renders back to source text. `parse(render(p))` is semantically
    /// equivalent to `p` for any `p` (§8).
    pub fn render(&self) -> String {
        render::render(self)
    }
}
