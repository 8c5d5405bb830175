use crate::error::{ViewerError, ViewerResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

/// Token plus its byte offset in the source, for error messages.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub(crate) token: Token,
    pub(crate) offset: usize,
}

/// Splits an expression into tokens.
///
/// Identifiers are `[A-Za-z_][A-Za-z0-9_]*`; any channel id can also be
/// written between backticks (`` `IA phase` ``).
pub(crate) fn tokenize(expression: &str) -> ViewerResult<Vec<Spanned>> {
    let bytes = expression.as_bytes();
    let mut idx = 0usize;
    let mut tokens = Vec::new();
    while idx < bytes.len() {
        let b = bytes[idx];
        if b.is_ascii_whitespace() {
            idx += 1;
            continue;
        }
        let offset = idx;
        let single = match b {
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'%' => Some(Token::Percent),
            b'^' => Some(Token::Caret),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(Spanned { token, offset });
            idx += 1;
            continue;
        }

        if b.is_ascii_digit() || b == b'.' {
            idx = scan_number(bytes, idx);
            let raw = &expression[offset..idx];
            let value = raw.parse::<f64>().map_err(|e| {
                ViewerError::expression(
                    expression,
                    format!("invalid numeric literal `{raw}` at {offset}: {e}"),
                )
            })?;
            tokens.push(Spanned {
                token: Token::Number(value),
                offset,
            });
        } else if b.is_ascii_alphabetic() || b == b'_' {
            idx += 1;
            while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
                idx += 1;
            }
            tokens.push(Spanned {
                token: Token::Ident(expression[offset..idx].to_owned()),
                offset,
            });
        } else if b == b'`' {
            let close = expression[offset + 1..].find('`').ok_or_else(|| {
                ViewerError::expression(expression, format!("unterminated quoted name at {offset}"))
            })?;
            let name = &expression[offset + 1..offset + 1 + close];
            if name.is_empty() {
                return Err(ViewerError::expression(
                    expression,
                    format!("empty quoted name at {offset}"),
                ));
            }
            tokens.push(Spanned {
                token: Token::Ident(name.to_owned()),
                offset,
            });
            idx = offset + close + 2;
        } else {
            let ch = expression[offset..].chars().next().unwrap_or('?');
            return Err(ViewerError::expression(
                expression,
                format!("unsupported character `{ch}` at {offset}"),
            ));
        }
    }
    if tokens.is_empty() {
        return Err(ViewerError::expression(expression, "expression is empty"));
    }
    Ok(tokens)
}

/// Digits with an optional fraction and an exponent that is only consumed when
/// followed by a digit, so `2e` stays `2` then the identifier `e`.
fn scan_number(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && (bytes[idx].is_ascii_digit() || bytes[idx] == b'.') {
        idx += 1;
    }
    if idx < bytes.len() && matches!(bytes[idx], b'e' | b'E') {
        let mut exp = idx + 1;
        if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            idx = exp;
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
        }
    }
    idx
}
