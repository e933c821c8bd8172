//! Error ledger: every diagnostic raised during a run, grouped by entity path.
//!
//! Recoverable diagnostics are listed per path. Critical diagnostics are also
//! collected into a set of distinct messages; a non-empty set means the batch
//! must not be written.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Diagnostic, ExportError, Halt};

/// How repeated messages are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupMode {
    /// Record each occurrence.
    #[default]
    EveryInstance,
    /// Record a given message once, under the first path that raised it.
    OncePerMessage,
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub code: &'static str,
    pub message: String,
    pub critical: bool,
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.critical {
            write!(f, "CRIT: {} ({})", self.message, self.code)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    mode: DedupMode,
    die_on_critical: bool,
    errors: BTreeMap<String, Vec<LedgerEntry>>,
    critical: BTreeSet<String>,
    seen: HashSet<String>,
    omitted: usize,
}

impl Ledger {
    #[must_use]
    pub fn new(mode: DedupMode, die_on_critical: bool) -> Self {
        Self {
            mode,
            die_on_critical,
            ..Self::default()
        }
    }

    /// Record a recoverable diagnostic.
    ///
    /// # Errors
    ///
    /// Never fails for recoverable diagnostics; the `Result` keeps the call
    /// sites uniform with [`critical`](Self::critical).
    pub fn report(&mut self, path: &str, diagnostic: Diagnostic) -> Result<(), Halt> {
        debug!(path, code = diagnostic.code.code(), "{}", diagnostic.message);
        self.push(path, &diagnostic, false);
        Ok(())
    }

    /// Record a critical diagnostic.
    ///
    /// # Errors
    ///
    /// Returns [`Halt`] when the ledger was configured to die on the first
    /// critical diagnostic.
    pub fn critical(&mut self, path: &str, diagnostic: Diagnostic) -> Result<(), Halt> {
        warn!(path, code = diagnostic.code.code(), "{}", diagnostic.message);
        self.critical.insert(diagnostic.message.clone());
        self.push(path, &diagnostic, true);
        if self.die_on_critical {
            return Err(Halt {
                path: path.to_string(),
                diagnostic,
            });
        }
        Ok(())
    }

    /// Route a transcoding failure to the matching severity.
    ///
    /// # Errors
    ///
    /// See [`critical`](Self::critical).
    pub fn record(&mut self, path: &str, err: ExportError) -> Result<(), Halt> {
        match err {
            ExportError::Skip(diagnostic) => self.report(path, diagnostic),
            ExportError::Abort(diagnostic) => self.critical(path, diagnostic),
        }
    }

    #[must_use]
    pub fn has_critical(&self) -> bool {
        !self.critical.is_empty()
    }

    /// Distinct critical messages.
    #[must_use]
    pub const fn critical_kinds(&self) -> &BTreeSet<String> {
        &self.critical
    }

    /// Recorded diagnostics, keyed by entity path.
    #[must_use]
    pub const fn errors(&self) -> &BTreeMap<String, Vec<LedgerEntry>> {
        &self.errors
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of entries dropped by [`DedupMode::OncePerMessage`].
    #[must_use]
    pub const fn omitted(&self) -> usize {
        self.omitted
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    fn push(&mut self, path: &str, diagnostic: &Diagnostic, critical: bool) {
        if self.mode == DedupMode::OncePerMessage && !self.seen.insert(diagnostic.message.clone())
        {
            self.omitted += 1;
            return;
        }
        self.errors
            .entry(path.to_string())
            .or_default()
            .push(LedgerEntry {
                code: diagnostic.code.code(),
                message: diagnostic.message.clone(),
                critical,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn diag(message: &str) -> Diagnostic {
        Diagnostic::new(ErrorCode::MalformedResult, message)
    }

    #[test]
    fn groups_by_path() {
        let mut ledger = Ledger::new(DedupMode::EveryInstance, false);
        ledger.report("/m/ai/p1", diag("bad")).expect("no halt");
        ledger.report("/m/ai/p1", diag("worse")).expect("no halt");
        ledger.report("/m/ai/p2", diag("bad")).expect("no halt");

        assert_eq!(ledger.errors().len(), 2);
        assert_eq!(ledger.errors()["/m/ai/p1"].len(), 2);
        assert_eq!(ledger.total(), 3);
        assert!(!ledger.has_critical());
    }

    #[test]
    fn once_per_message_suppresses_repeats() {
        let mut ledger = Ledger::new(DedupMode::OncePerMessage, false);
        ledger.report("/a", diag("same")).expect("no halt");
        ledger.report("/b", diag("same")).expect("no halt");
        ledger.report("/b", diag("other")).expect("no halt");

        assert_eq!(ledger.total(), 2);
        assert_eq!(ledger.omitted(), 1);
        assert_eq!(ledger.errors()["/a"][0].message, "same");
        assert_eq!(ledger.errors()["/b"].len(), 1);
        assert_eq!(ledger.errors()["/b"][0].message, "other");
    }

    #[test]
    fn critical_is_tracked_even_when_deduplicated() {
        let mut ledger = Ledger::new(DedupMode::OncePerMessage, false);
        let crit = Diagnostic::new(ErrorCode::DuplicateVote, "dup");
        ledger.critical("/a", crit.clone()).expect("no halt");
        ledger.critical("/b", crit).expect("no halt");

        assert!(ledger.has_critical());
        assert_eq!(ledger.critical_kinds().len(), 1);
        let entry = &ledger.errors()["/a"][0];
        assert!(entry.critical);
        assert_eq!(entry.to_string(), "CRIT: dup (E3002)");
    }

    #[test]
    fn die_on_critical_halts() {
        let mut ledger = Ledger::new(DedupMode::EveryInstance, true);
        ledger.report("/a", diag("soft")).expect("soft never halts");
        let halt = ledger
            .record("/b", ExportError::abort(ErrorCode::UnknownPlugin, "no such plugin"))
            .expect_err("must halt");
        assert_eq!(halt.path, "/b");
        assert!(ledger.has_critical());
    }
}
