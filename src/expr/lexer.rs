//! Tokenizer for coefficient expressions.

use crate::cdr_error::CdrError;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    End,
}

/// A token with the byte offset it starts at.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

pub(crate) fn syntax_error(source: &str, position: usize, message: impl Into<String>) -> CdrError {
    CdrError::Expression {
        expression: source.to_string(),
        position,
        message: message.into(),
    }
}

/// Split `source` into tokens; the last token is always [`TokenKind::End`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, CdrError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        let kind = match c {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'^' => TokenKind::Caret,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b',' => TokenKind::Comma,
            b'0'..=b'9' | b'.' => {
                pos = scan_number(bytes, pos);
                let text = &source[start..pos];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| syntax_error(source, start, format!("bad number `{text}`")))?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    offset: start,
                });
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(source[start..pos].to_string()),
                    offset: start,
                });
                continue;
            }
            other => {
                return Err(syntax_error(
                    source,
                    start,
                    format!("unexpected character `{}`", other as char),
                ));
            }
        };
        tokens.push(Token {
            kind,
            offset: start,
        });
        pos += 1;
    }
    tokens.push(Token {
        kind: TokenKind::End,
        offset: bytes.len(),
    });
    Ok(tokens)
}

fn scan_number(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
        pos += 1;
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scientific_notation_is_one_token() {
        let tokens = tokenize("1.0e-3*x").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number(1.0e-3));
        assert_eq!(tokens[1].kind, TokenKind::Star);
        assert_eq!(tokens[2].kind, TokenKind::Ident("x".into()));
        assert_eq!(tokens[3].kind, TokenKind::End);
    }

    #[test]
    fn exp_function_is_not_an_exponent() {
        let tokens = tokenize("2*exp(1)").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number(2.0));
        assert_eq!(tokens[2].kind, TokenKind::Ident("exp".into()));
    }

    #[test]
    fn rejects_stray_characters() {
        let err = tokenize("x # y").unwrap_err();
        assert!(matches!(err, CdrError::Expression { position: 2, .. }));
    }
}
