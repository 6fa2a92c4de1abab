//! Diagnostics collected during an import

use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

/// Everything an import skipped or patched up, in order.
///
/// Each entry is also emitted as a tracing event when it is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    entries: Vec<Diagnostic>,
}

impl ImportReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.entries.push(Diagnostic {
            level: Level::Warning,
            message,
        });
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.entries.push(Diagnostic {
            level: Level::Error,
            message,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.level == Level::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.level == Level::Error)
    }

    /// True when nothing was reported
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }
}
