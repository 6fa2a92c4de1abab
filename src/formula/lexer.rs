//! Tokenizer for address formulas

use crate::core::types::{MemoryError, MemoryResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Number(u64),
    Module(String),
    Plus,
    Minus,
    Open,
    Close,
}

/// Splits formula text into tokens.
///
/// Literals are hexadecimal whether or not they carry a `0x` prefix.
pub(crate) fn tokenize(input: &str) -> MemoryResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '[' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ']' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '<' => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '>' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(MemoryError::parse_error(input, "unterminated module name"));
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(MemoryError::parse_error(input, "empty module name"));
                }
                tokens.push(Token::Module(name.to_string()));
            }
            c if c.is_ascii_alphanumeric() => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !c.is_ascii_alphanumeric() {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Number(literal(input, &input[start..end])?));
            }
            other => {
                return Err(MemoryError::parse_error(
                    input,
                    format!("unexpected character '{}' at {}", other, start),
                ));
            }
        }
    }

    Ok(tokens)
}

fn literal(input: &str, text: &str) -> MemoryResult<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    u64::from_str_radix(digits, 16).map_err(|_| {
        MemoryError::parse_error(input, format!("'{}' is not a hexadecimal offset", text))
    })
}
