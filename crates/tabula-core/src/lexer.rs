//! Tokenizer for the SELECT dialect understood by the tabular engine.
//!
//! Keywords are not distinguished here; the parser compares identifier
//! tokens case-insensitively. Characters with no meaning in the dialect are
//! kept as [`Token::Other`] so clauses the engine ignores (joins, ORDER BY
//! expressions) never fail to tokenize.

use std::fmt;

use crate::error::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare identifier or keyword.
    Ident(String),
    /// `"name"` or `` `name` ``.
    QuotedIdent(String),
    /// `'text'` with `''` unescaped.
    Str(String),
    Number(String),
    Comma,
    Dot,
    LParen,
    RParen,
    Star,
    Semicolon,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Other(char),
}

impl Token {
    /// True if this is the bare keyword `kw` (case-insensitive).
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::QuotedIdent(s) => write!(f, "\"{}\"", s),
            Token::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Token::Number(s) => write!(f, "{}", s),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Star => write!(f, "*"),
            Token::Semicolon => write!(f, ";"),
            Token::Eq => write!(f, "="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::Other(c) => write!(f, "{}", c),
        }
    }
}

/// Split a query string into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, i, '\'')
                    .ok_or_else(|| QueryError::Parse("unterminated string literal".to_string()))?;
                tokens.push(Token::Str(text));
                i = next;
            }
            '"' | '`' => {
                let (text, next) = read_quoted(&chars, i, c).ok_or_else(|| {
                    QueryError::Parse("unterminated quoted identifier".to_string())
                })?;
                tokens.push(Token::QuotedIdent(text));
                i = next;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('<', Some('=')) => (Token::LtEq, 2),
                    ('<', Some('>')) => (Token::NotEq, 2),
                    ('>', Some('=')) => (Token::GtEq, 2),
                    ('!', Some('=')) => (Token::NotEq, 2),
                    ('<', _) => (Token::Lt, 1),
                    ('>', _) => (Token::Gt, 1),
                    ('=', _) => (Token::Eq, 1),
                    (',', _) => (Token::Comma, 1),
                    ('.', _) => (Token::Dot, 1),
                    ('(', _) => (Token::LParen, 1),
                    (')', _) => (Token::RParen, 1),
                    ('*', _) => (Token::Star, 1),
                    (';', _) => (Token::Semicolon, 1),
                    (other, _) => (Token::Other(other), 1),
                };
                tokens.push(token);
                i += width;
            }
        }
    }

    Ok(tokens)
}

/// Read a quoted run starting at `start` (the opening quote). A doubled
/// quote inside the run stands for one literal quote character.
fn read_quoted(chars: &[char], start: usize, quote: char) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                text.push(quote);
                i += 2;
                continue;
            }
            return Some((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }
    None
}
