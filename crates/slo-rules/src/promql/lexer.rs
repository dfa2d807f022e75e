//! Tokenizer for the PromQL subset used by rule templates and selectors.

use std::time::Duration;

use crate::duration::parse_duration;

use super::ParseError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Number(f64),
    Duration(Duration),
    Str(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eql,
    Neq,
    Gtr,
    Lss,
    Gte,
    Lte,
    Assign,
    RegexMatch,
    RegexNoMatch,
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            b'(' => single(&mut i, Token::LParen),
            b')' => single(&mut i, Token::RParen),
            b'{' => single(&mut i, Token::LBrace),
            b'}' => single(&mut i, Token::RBrace),
            b'[' => single(&mut i, Token::LBracket),
            b']' => single(&mut i, Token::RBracket),
            b',' => single(&mut i, Token::Comma),
            b'+' => single(&mut i, Token::Add),
            b'-' => single(&mut i, Token::Sub),
            b'*' => single(&mut i, Token::Mul),
            b'/' => single(&mut i, Token::Div),
            b'%' => single(&mut i, Token::Mod),
            b'^' => single(&mut i, Token::Pow),
            b'=' => match bytes.get(i + 1) {
                Some(b'=') => double(&mut i, Token::Eql),
                Some(b'~') => double(&mut i, Token::RegexMatch),
                _ => single(&mut i, Token::Assign),
            },
            b'!' => match bytes.get(i + 1) {
                Some(b'=') => double(&mut i, Token::Neq),
                Some(b'~') => double(&mut i, Token::RegexNoMatch),
                _ => return Err(ParseError::new(start, "unexpected character '!'")),
            },
            b'>' => match bytes.get(i + 1) {
                Some(b'=') => double(&mut i, Token::Gte),
                _ => single(&mut i, Token::Gtr),
            },
            b'<' => match bytes.get(i + 1) {
                Some(b'=') => double(&mut i, Token::Lte),
                _ => single(&mut i, Token::Lss),
            },
            b'"' | b'\'' => {
                let (value, end) = lex_string(input, i)?;
                i = end;
                Token::Str(value)
            }
            b'`' => {
                let rest = &input[i + 1..];
                let len = rest
                    .find('`')
                    .ok_or_else(|| ParseError::new(start, "unterminated raw string"))?;
                i += len + 2;
                Token::Str(rest[..len].to_string())
            }
            c if c.is_ascii_digit() || c == b'.' => {
                let (token, end) = lex_number(input, i)?;
                i = end;
                token
            }
            c if is_ident_start(c) => {
                let end = i + bytes[i..]
                    .iter()
                    .take_while(|b| is_ident_continue(**b))
                    .count();
                let ident = input[i..end].to_string();
                i = end;
                Token::Ident(ident)
            }
            _ => {
                let ch = input[i..].chars().next().unwrap_or_default();
                return Err(ParseError::new(start, format!("unexpected character {ch:?}")));
            }
        };

        tokens.push(Spanned { token, pos: start });
    }

    Ok(tokens)
}

fn single(i: &mut usize, token: Token) -> Token {
    *i += 1;
    token
}

fn double(i: &mut usize, token: Token) -> Token {
    *i += 2;
    token
}

const fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b':'
}

const fn is_ident_continue(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Lexes a number or, when letters follow the digits, a duration.
fn lex_number(input: &str, start: usize) -> Result<(Token, usize), ParseError> {
    let bytes = input.as_bytes();
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }

    if end < bytes.len() && bytes[end].is_ascii_alphabetic() {
        while end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
            end += 1;
        }
        let text = &input[start..end];
        if let Ok(duration) = parse_duration(text) {
            return Ok((Token::Duration(duration), end));
        }
        return text
            .parse::<f64>()
            .map(|n| (Token::Number(n), end))
            .map_err(|_| ParseError::new(start, format!("invalid number or duration {text:?}")));
    }

    let text = &input[start..end];
    text.parse::<f64>()
        .map(|n| (Token::Number(n), end))
        .map_err(|_| ParseError::new(start, format!("invalid number {text:?}")))
}

/// Lexes a single or double quoted string, returning the unescaped value and
/// the offset after the closing quote.
fn lex_string(input: &str, start: usize) -> Result<(String, usize), ParseError> {
    let mut chars = input[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(ParseError::new(start, "expected string"));
    };

    let mut value = String::new();
    while let Some((offset, c)) = chars.next() {
        if c == quote {
            return Ok((value, start + offset + c.len_utf8()));
        }
        if c != '\\' {
            value.push(c);
            continue;
        }

        let Some((esc_offset, esc)) = chars.next() else {
            break;
        };
        match esc {
            'n' => value.push('\n'),
            'r' => value.push('\r'),
            't' => value.push('\t'),
            'a' => value.push('\u{07}'),
            'b' => value.push('\u{08}'),
            'f' => value.push('\u{0c}'),
            'v' => value.push('\u{0b}'),
            '\\' | '"' | '\'' => value.push(esc),
            'x' | 'u' | 'U' => {
                let digits = match esc {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut code = 0u32;
                for _ in 0..digits {
                    let digit = chars
                        .next()
                        .and_then(|(_, d)| d.to_digit(16))
                        .ok_or_else(|| {
                            ParseError::new(start + esc_offset, "invalid escape sequence")
                        })?;
                    code = code * 16 + digit;
                }
                let decoded = char::from_u32(code).ok_or_else(|| {
                    ParseError::new(start + esc_offset, "escape is not a valid character")
                })?;
                value.push(decoded);
            }
            other => {
                return Err(ParseError::new(
                    start + esc_offset,
                    format!("unknown escape sequence \\{other}"),
                ));
            }
        }
    }

    Err(ParseError::new(start, "unterminated string"))
}
