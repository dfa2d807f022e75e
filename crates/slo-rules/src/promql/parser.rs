//! Recursive descent parser for the PromQL subset.
//!
//! Supported: number literals, vector and range selectors with `offset`,
//! function calls, aggregations with `by`/`without` on either side of the
//! argument, parentheses and all binary operators with Prometheus precedence.
//! String literals, subqueries, `@` modifiers and vector matching are not.

use std::time::Duration;

use crate::matcher::{MatchType, Matcher};

use super::ParseError;
use super::ast::{AggregateExpr, BinaryExpr, BinaryOp, Call, Expr, MatrixSelector, VectorSelector};
use super::lexer::{Spanned, Token, tokenize};

const AGGREGATIONS: [&str; 8] = [
    "sum", "avg", "count", "min", "max", "group", "stddev", "stdvar",
];

/// Parses an expression.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.expr(0)?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses a single instant vector selector such as `up{job="api"}`.
pub fn parse_selector(input: &str) -> Result<VectorSelector, ParseError> {
    let mut parser = Parser::new(input)?;
    let selector = match parser.next() {
        Some(Token::Ident(name)) => parser.selector(name)?,
        Some(Token::LBrace) => {
            parser.pos -= 1;
            parser.selector(String::new())?
        }
        _ => return Err(parser.error("expected metric selector")),
    };
    parser.expect_end()?;
    Ok(selector)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            len: input.len(),
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|s| &s.token)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.len, |s| s.pos)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.position(), message)
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ParseError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        let op = match self.peek()? {
            Token::Add => BinaryOp::Add,
            Token::Sub => BinaryOp::Sub,
            Token::Mul => BinaryOp::Mul,
            Token::Div => BinaryOp::Div,
            Token::Mod => BinaryOp::Mod,
            Token::Pow => BinaryOp::Pow,
            Token::Eql => BinaryOp::Eql,
            Token::Neq => BinaryOp::Neq,
            Token::Gtr => BinaryOp::Gtr,
            Token::Lss => BinaryOp::Lss,
            Token::Gte => BinaryOp::Gte,
            Token::Lte => BinaryOp::Lte,
            Token::Ident(s) if s == "and" => BinaryOp::And,
            Token::Ident(s) if s == "or" => BinaryOp::Or,
            Token::Ident(s) if s == "unless" => BinaryOp::Unless,
            _ => return None,
        };
        Some(op)
    }

    fn expr(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;

        while let Some(op) = self.peek_binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;

            let return_bool = op.is_comparison() && self.eat_keyword("bool");
            let next_min = if op.is_right_associative() {
                precedence
            } else {
                precedence + 1
            };
            let rhs = self.expr(next_min)?;

            lhs = Expr::Binary(Box::new(BinaryExpr {
                op,
                lhs,
                rhs,
                return_bool,
            }));
        }

        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::Sub) {
            if let Some(Token::Number(n)) = self.peek_at(1) {
                let n = *n;
                self.pos += 2;
                return Ok(Expr::Number(-n));
            }
            return Err(self.error("unary minus is only supported on numbers"));
        }
        if self.peek() == Some(&Token::Add) {
            self.pos += 1;
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expr(0)?;
                self.expect(&Token::RParen, "')'")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            Some(Token::LBrace) => {
                self.pos -= 1;
                let selector = self.selector(String::new())?;
                self.range_and_offset(selector)
            }
            Some(Token::Ident(name)) => {
                let is_aggregation = AGGREGATIONS.contains(&name.as_str())
                    && (matches!(self.peek(), Some(Token::LParen))
                        || matches!(self.peek(), Some(Token::Ident(k)) if k == "by" || k == "without"));
                if is_aggregation {
                    return self.aggregation(name);
                }
                if self.peek() == Some(&Token::LParen) {
                    return self.call(name);
                }
                let selector = self.selector(name)?;
                self.range_and_offset(selector)
            }
            Some(other) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected token {other:?}")))
            }
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn aggregation(&mut self, op: String) -> Result<Expr, ParseError> {
        let mut modifier = self.grouping_modifier()?;

        self.expect(&Token::LParen, "'(' after aggregation")?;
        let inner = self.expr(0)?;
        self.expect(&Token::RParen, "')'")?;

        if modifier.is_none() {
            modifier = self.grouping_modifier()?;
        }
        let (without, grouping) = modifier.unwrap_or_default();

        Ok(Expr::Aggregate(AggregateExpr {
            op,
            grouping,
            without,
            expr: Box::new(inner),
        }))
    }

    fn grouping_modifier(&mut self) -> Result<Option<(bool, Vec<String>)>, ParseError> {
        let without = if self.eat_keyword("by") {
            false
        } else if self.eat_keyword("without") {
            true
        } else {
            return Ok(None);
        };

        self.expect(&Token::LParen, "'(' after grouping keyword")?;
        let mut labels = Vec::new();
        loop {
            match self.next() {
                Some(Token::RParen) => break,
                Some(Token::Ident(label)) => {
                    labels.push(label);
                    match self.next() {
                        Some(Token::Comma) => {}
                        Some(Token::RParen) => break,
                        _ => return Err(self.error("expected ',' or ')' in grouping")),
                    }
                }
                _ => return Err(self.error("expected label name in grouping")),
            }
        }
        Ok(Some((without, labels)))
    }

    fn call(&mut self, func: String) -> Result<Expr, ParseError> {
        self.expect(&Token::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.expr(0)?);
                match self.next() {
                    Some(Token::Comma) => {}
                    Some(Token::RParen) => break,
                    _ => return Err(self.error("expected ',' or ')' in call")),
                }
            }
        }
        Ok(Expr::Call(Call { func, args }))
    }

    fn selector(&mut self, name: String) -> Result<VectorSelector, ParseError> {
        let mut matchers = Vec::new();

        if self.peek() == Some(&Token::LBrace) {
            self.pos += 1;
            loop {
                let label = match self.next() {
                    Some(Token::RBrace) => break,
                    Some(Token::Ident(label)) => label,
                    _ => return Err(self.error("expected label name")),
                };
                let match_type = match self.next() {
                    Some(Token::Assign) => MatchType::Equal,
                    Some(Token::Neq) => MatchType::NotEqual,
                    Some(Token::RegexMatch) => MatchType::Regex,
                    Some(Token::RegexNoMatch) => MatchType::NotRegex,
                    _ => return Err(self.error("expected label match operator")),
                };
                let value = match self.next() {
                    Some(Token::Str(value)) => value,
                    _ => return Err(self.error("expected quoted label value")),
                };
                let matcher = Matcher::new(match_type, label, value)
                    .map_err(|e| self.error(e.to_string()))?;
                matchers.push(matcher);

                match self.next() {
                    Some(Token::Comma) => {}
                    Some(Token::RBrace) => break,
                    _ => return Err(self.error("expected ',' or '}' in selector")),
                }
            }
        }

        if name.is_empty() && matchers.is_empty() {
            return Err(self.error("selector needs a metric name or a label matcher"));
        }

        let offset = self.offset()?;
        Ok(VectorSelector {
            name,
            matchers,
            offset,
        })
    }

    fn offset(&mut self) -> Result<Duration, ParseError> {
        if !self.eat_keyword("offset") {
            return Ok(Duration::ZERO);
        }
        match self.next() {
            Some(Token::Duration(d)) => Ok(d),
            _ => Err(self.error("expected duration after offset")),
        }
    }

    fn range_and_offset(&mut self, mut selector: VectorSelector) -> Result<Expr, ParseError> {
        if self.peek() != Some(&Token::LBracket) {
            return Ok(Expr::Vector(selector));
        }
        if !selector.offset.is_zero() {
            return Err(self.error("offset must follow the range"));
        }
        self.pos += 1;
        let range = match self.next() {
            Some(Token::Duration(d)) => d,
            _ => return Err(self.error("expected range duration")),
        };
        self.expect(&Token::RBracket, "']'")?;
        selector.offset = self.offset()?;
        Ok(Expr::Matrix(MatrixSelector { selector, range }))
    }
}
