//! Address formula syntax tree

use super::parser;
use super::resolve::AddressResolver;
use crate::core::types::{Address, MemoryError, MemoryResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Operator joining a term to the running total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

/// One operand of a formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Literal offset
    Offset(u64),
    /// Base address of a named module
    Module(String),
    /// Pointer read from the address the inner formula computes
    Deref(Formula),
}

/// Parsed address expression, evaluated strictly left to right.
///
/// ```
/// use memclass::formula::Formula;
///
/// let formula: Formula = "[<game.exe> + 0x10] + 4".parse().unwrap();
/// assert_eq!(formula.to_string(), "[<game.exe> + 0x10] + 0x4");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    terms: Vec<(Sign, Term)>,
}

impl Formula {
    /// A formula holding a single term
    pub fn new(term: Term) -> Self {
        Formula {
            terms: vec![(Sign::Plus, term)],
        }
    }

    /// A constant address
    pub fn offset(value: u64) -> Self {
        Self::new(Term::Offset(value))
    }

    /// Appends a term
    pub fn then(mut self, sign: Sign, term: Term) -> Self {
        self.terms.push((sign, term));
        self
    }

    pub(crate) fn from_terms(terms: Vec<(Sign, Term)>) -> Self {
        Formula { terms }
    }

    pub fn terms(&self) -> &[(Sign, Term)] {
        &self.terms
    }

    /// True when evaluation needs no module lookup or pointer read
    pub fn is_constant(&self) -> bool {
        self.terms
            .iter()
            .all(|(_, term)| matches!(term, Term::Offset(_)))
    }

    /// Resolves the formula against a target.
    ///
    /// Literal and module terms are added to (or subtracted from) the
    /// running total; a bracket term replaces the running total with the
    /// pointer stored at the address its inner formula computes, so
    /// `10 + [<game.exe>]` yields whatever `game.exe` points at. The result
    /// is truncated to the target's pointer width.
    pub fn evaluate<R>(&self, resolver: &R) -> MemoryResult<Address>
    where
        R: AddressResolver + ?Sized,
    {
        let mut running = Address::null();

        for (sign, term) in &self.terms {
            let value = match term {
                Term::Offset(value) => *value,
                Term::Module(name) => resolver.module_base(name)?.as_u64(),
                Term::Deref(inner) => {
                    let slot = inner.evaluate(resolver)?;
                    running = resolver.read_pointer(slot)?;
                    trace!("Dereferenced {} -> {}", slot, running);
                    continue;
                }
            };

            running = match sign {
                Sign::Plus => running + value,
                Sign::Minus => running - value,
            };
        }

        Ok(running.truncate(resolver.pointer_size()))
    }
}

impl Default for Formula {
    fn default() -> Self {
        Formula::offset(0)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Offset(value) => write!(f, "0x{:X}", value),
            Term::Module(name) => write!(f, "<{}>", name),
            Term::Deref(inner) => write!(f, "[{}]", inner),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (sign, term)) in self.terms.iter().enumerate() {
            match (index, sign) {
                (0, Sign::Plus) => {}
                (0, Sign::Minus) => f.write_str("-")?,
                (_, Sign::Plus) => f.write_str(" + ")?,
                (_, Sign::Minus) => f.write_str(" - ")?,
            }
            write!(f, "{}", term)?;
        }
        Ok(())
    }
}

impl FromStr for Formula {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse(s)
    }
}

impl Serialize for Formula {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Formula {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
