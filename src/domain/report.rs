//! Per-resource translation/sanitization outcomes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status codes written back to the resource store by the Reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReportStatus {
    Pending = 0,
    Accepted = 1,
    Rejected = 2,
    Warning = 3,
}

/// Errors and warnings accumulated for one resource identity by the translator
/// and mutated in place by sanitizers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Report {
    pub fn status(&self) -> ReportStatus {
        if !self.errors.is_empty() {
            ReportStatus::Rejected
        } else if !self.warnings.is_empty() {
            ReportStatus::Warning
        } else {
            ReportStatus::Accepted
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Moves every error into warnings, as the upstream-removing sanitizer does
    /// when it excises a failing cluster rather than failing the whole publish.
    pub fn demote_errors_to_warnings(&mut self) {
        self.warnings.append(&mut self.errors);
    }
}

/// Map from resource identity (e.g. an upstream's `UpstreamRef` rendered as a
/// string) to its accumulated report.
pub type ReportSet = BTreeMap<String, Report>;
