//! Recursive-descent parser for address formulas
//!
//! ```text
//! formula := [sign] term (sign term)*
//! term    := number | '<' module '>' | '[' formula ']'
//! sign    := '+' | '-'
//! ```

use super::ast::{Formula, Sign, Term};
use super::lexer::{tokenize, Token};
use crate::core::types::{MemoryError, MemoryResult};

/// Bracket nesting limit
const MAX_DEPTH: usize = 32;

/// Parses formula text
pub fn parse(input: &str) -> MemoryResult<Formula> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens: &tokens,
        pos: 0,
    };

    let formula = parser.formula(0)?;
    match parser.peek() {
        None => Ok(formula),
        Some(token) => Err(parser.error(format!("unexpected {:?}", token))),
    }
}

struct Parser<'a> {
    input: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, reason: impl Into<String>) -> MemoryError {
        MemoryError::parse_error(self.input, reason)
    }

    fn sign(&mut self) -> Option<Sign> {
        let sign = match self.peek()? {
            Token::Plus => Sign::Plus,
            Token::Minus => Sign::Minus,
            _ => return None,
        };
        self.pos += 1;
        Some(sign)
    }

    fn formula(&mut self, depth: usize) -> MemoryResult<Formula> {
        if depth > MAX_DEPTH {
            return Err(self.error("dereferences nested too deeply"));
        }

        let first_sign = self.sign().unwrap_or(Sign::Plus);
        let mut terms = vec![self.signed_term(first_sign, depth)?];

        while let Some(sign) = self.sign() {
            terms.push(self.signed_term(sign, depth)?);
        }

        Ok(Formula::from_terms(terms))
    }

    /// A dereference replaces the running total, so it cannot be subtracted
    fn signed_term(&mut self, sign: Sign, depth: usize) -> MemoryResult<(Sign, Term)> {
        let term = self.term(depth)?;
        if sign == Sign::Minus && matches!(term, Term::Deref(_)) {
            return Err(self.error("a dereference cannot be subtracted"));
        }
        Ok((sign, term))
    }

    fn term(&mut self, depth: usize) -> MemoryResult<Term> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Term::Offset(*value)),
            Some(Token::Module(name)) => Ok(Term::Module(name.clone())),
            Some(Token::Open) => {
                let inner = self.formula(depth + 1)?;
                match self.next() {
                    Some(Token::Close) => Ok(Term::Deref(inner)),
                    _ => Err(self.error("missing ']'")),
                }
            }
            Some(token) => Err(self.error(format!("expected a term, found {:?}", token))),
            None => Err(self.error("expected a term")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_module_plus_offset() {
        let formula = parse("<game.exe> + 0x10").unwrap();
        assert_eq!(
            formula.terms(),
            &[
                (Sign::Plus, Term::Module("game.exe".into())),
                (Sign::Plus, Term::Offset(0x10)),
            ]
        );
    }

    #[test]
    fn test_parse_nested_deref() {
        let formula = parse("[[<a.dll>] + 8] - 0x4").unwrap();
        let inner = Formula::new(Term::Deref(Formula::new(Term::Module("a.dll".into()))))
            .then(Sign::Plus, Term::Offset(8));
        let expected = Formula::new(Term::Deref(inner)).then(Sign::Minus, Term::Offset(4));
        assert_eq!(formula, expected);
    }

    #[test]
    fn test_leading_sign() {
        let formula = parse("-10").unwrap();
        assert_eq!(formula.terms(), &[(Sign::Minus, Term::Offset(0x10))]);
        assert_eq!(formula.to_string(), "-0x10");
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["0x400000", "<game.exe> + 0x10", "[<game.exe> + 0x10] + 0x4", "[[0x1000]] - 0x8"] {
            assert_eq!(parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_errors() {
        for text in ["", "+", "<a> +", "[<a>", "<a>]", "<a> <b>", "[]", "8 - [<a>]", "-[1000]"] {
            assert!(
                matches!(parse(text), Err(MemoryError::ParseError { .. })),
                "{:?} should not parse",
                text
            );
        }
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "[".repeat(40), "]".repeat(40));
        assert!(parse(&deep).is_err());

        let fine = format!("{}1{}", "[".repeat(4), "]".repeat(4));
        assert!(parse(&fine).is_ok());
    }
}
