//! Partial-order assertions over journal contents.
//!
//! Scenario tests describe the records an operation must produce, in
//! order, without pinning down everything else the log may contain:
//!
//! ```rust,ignore
//! assert_partial_ordered(
//!     &[
//!         Expected::start(t),
//!         Expected::entry(EntryType::CreateBinary, t).mentioning("/db/test/LICENSE"),
//!         Expected::commit(t),
//!     ],
//!     &read_latest_journal(dir)?,
//! );
//! ```

use std::fmt;
use strata_core::{EntryType, Loggable, TxnId};

/// One expected record: its kind, optionally its transaction, and
/// optionally text its summary must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    kind: EntryType,
    txn: Option<TxnId>,
    mentions: Vec<String>,
}

impl Expected {
    /// Expects a record of `kind` written by `txn`.
    pub fn entry(kind: EntryType, txn: TxnId) -> Self {
        Self {
            kind,
            txn: Some(txn),
            mentions: Vec::new(),
        }
    }

    /// Expects a record of `kind` from any transaction.
    pub fn any(kind: EntryType) -> Self {
        Self {
            kind,
            txn: None,
            mentions: Vec::new(),
        }
    }

    /// `TxnStart` for `txn`.
    pub fn start(txn: TxnId) -> Self {
        Self::entry(EntryType::TxnStart, txn)
    }

    /// `TxnCommit` for `txn`.
    pub fn commit(txn: TxnId) -> Self {
        Self::entry(EntryType::TxnCommit, txn)
    }

    /// `TxnAbort` for `txn`.
    pub fn abort(txn: TxnId) -> Self {
        Self::entry(EntryType::TxnAbort, txn)
    }

    /// Any checkpoint.
    pub fn checkpoint() -> Self {
        Self::any(EntryType::Checkpoint)
    }

    /// Additionally requires the record's summary to contain `text`.
    #[must_use]
    pub fn mentioning(mut self, text: impl Into<String>) -> Self {
        self.mentions.push(text.into());
        self
    }

    /// Returns true if `record` satisfies this expectation.
    #[must_use]
    pub fn matches(&self, record: &Loggable) -> bool {
        if record.entry_type() != self.kind {
            return false;
        }
        if self.txn.is_some_and(|t| t != record.txn_id()) {
            return false;
        }
        if self.mentions.is_empty() {
            return true;
        }
        let summary = record.summary();
        self.mentions.iter().all(|m| summary.contains(m.as_str()))
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        if let Some(txn) = self.txn {
            write!(f, "({txn})")?;
        }
        for m in &self.mentions {
            write!(f, " ~{m:?}")?;
        }
        Ok(())
    }
}

/// Returns the index in `actual` of each expected record, or the index of
/// the first expectation that could not be matched.
pub fn match_partial_ordered(expected: &[Expected], actual: &[Loggable]) -> Result<Vec<usize>, usize> {
    let mut positions = Vec::with_capacity(expected.len());
    let mut next = 0;
    for (i, want) in expected.iter().enumerate() {
        match actual[next..].iter().position(|r| want.matches(r)) {
            Some(offset) => {
                positions.push(next + offset);
                next += offset + 1;
            }
            None => return Err(i),
        }
    }
    Ok(positions)
}

/// Asserts that `expected` occurs in `actual` as a subsequence.
///
/// # Panics
///
/// Panics with both sequences listed if the match fails.
pub fn assert_partial_ordered(expected: &[Expected], actual: &[Loggable]) {
    if let Err(missing) = match_partial_ordered(expected, actual) {
        let wanted: Vec<String> = expected.iter().map(ToString::to_string).collect();
        let found: Vec<String> = actual
            .iter()
            .map(|r| format!("{}({}) {}", r.entry_type().name(), r.txn_id(), r.summary()))
            .collect();
        panic!(
            "expected record #{missing} ({}) not found in order\nexpected: {wanted:#?}\nactual: {found:#?}",
            expected[missing]
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(txn: u64, path: &str) -> Loggable {
        Loggable::CreateBinary {
            txn_id: TxnId(txn),
            path: path.into(),
        }
    }

    #[test]
    fn subsequence_matches_with_gaps() {
        let log = vec![
            Loggable::TxnStart { txn_id: TxnId(1) },
            create(1, "/db/a"),
            Loggable::TxnStart { txn_id: TxnId(2) },
            create(1, "/db/b"),
            Loggable::TxnCommit { txn_id: TxnId(1) },
        ];
        let expected = [
            Expected::start(TxnId(1)),
            Expected::entry(EntryType::CreateBinary, TxnId(1)).mentioning("/db/b"),
            Expected::commit(TxnId(1)),
        ];
        assert_eq!(match_partial_ordered(&expected, &log), Ok(vec![0, 3, 4]));
    }

    #[test]
    fn order_matters() {
        let log = vec![
            Loggable::TxnCommit { txn_id: TxnId(1) },
            Loggable::TxnStart { txn_id: TxnId(1) },
        ];
        let expected = [Expected::start(TxnId(1)), Expected::commit(TxnId(1))];
        assert_eq!(match_partial_ordered(&expected, &log), Err(1));
    }

    #[test]
    #[should_panic(expected = "not found in order")]
    fn assertion_panics_on_missing_record() {
        assert_partial_ordered(&[Expected::abort(TxnId(9))], &[]);
    }

    #[test]
    fn display_lists_constraints() {
        let e = Expected::entry(EntryType::CreateBinary, TxnId(3)).mentioning("LICENSE");
        assert_eq!(e.to_string(), "CreateBinary(txn:3) ~\"LICENSE\"");
    }
}
