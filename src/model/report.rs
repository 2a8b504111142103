//! The outcome of posting a session into the grid store.

use crate::error::{ErrorType, StoreErrorKind};
use crate::model::amount::format_amount;
use crate::model::CellAddress;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value that was written into the grid.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct WrittenEntry {
    pub cell: CellAddress,
    pub label: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Why a value was not written.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// No column binding exists for the subject.
    Unrouted(String),
    /// No free row or cell was left in the bounded range.
    SlotExhausted,
    /// The grid store rejected the write or the read before it, possibly after retries.
    Store { kind: StoreErrorKind, message: String },
    /// The entry cannot be posted as it is, e.g. a card without a paired amount.
    Invalid(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Unrouted(subject) => write!(f, "no column bound for '{subject}'"),
            FailureReason::SlotExhausted => write!(f, "no free slot left in the target range"),
            FailureReason::Store { message, .. } => write!(f, "write failed: {message}"),
            FailureReason::Invalid(message) => write!(f, "{message}"),
        }
    }
}

impl FailureReason {
    /// The error category this failure falls into.
    pub fn error_type(&self) -> ErrorType {
        match self {
            FailureReason::Unrouted(_) => ErrorType::UnroutedSubject,
            FailureReason::SlotExhausted => ErrorType::SlotExhausted,
            FailureReason::Store { kind, .. } => kind.error_type(),
            FailureReason::Invalid(_) => ErrorType::Validation,
        }
    }
}

/// A value that could not be written, reported so the operator can act on it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub reason: FailureReason,
}

/// How a confirmed session is written into the grid.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostMode {
    /// Merge everything into one new row of the range.
    #[default]
    Add,
    /// Post each value into the next free cell of its own column.
    Rate,
}

serde_plain::derive_display_from_serialize!(PostMode);
serde_plain::derive_fromstr_from_deserialize!(PostMode);

/// How a post ended, from the session's point of view.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Posted,
    PartiallyPosted,
    Failed,
}

serde_plain::derive_display_from_serialize!(PostStatus);

/// Per-entry report of a post. Callers render `written` as a confirmation and `failed` as
/// explicit warnings.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PostResult {
    pub written: Vec<WrittenEntry>,
    pub failed: Vec<FailedEntry>,
    /// The grid rows that received values.
    pub rows: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<i64>,
}

impl PostResult {
    /// True when at least one value reached the grid.
    pub fn success(&self) -> bool {
        !self.written.is_empty()
    }

    pub fn status(&self) -> PostStatus {
        match (self.written.is_empty(), self.failed.is_empty()) {
            (false, true) => PostStatus::Posted,
            (false, false) => PostStatus::PartiallyPosted,
            (true, _) => PostStatus::Failed,
        }
    }

    pub(crate) fn push_written(&mut self, entry: WrittenEntry) {
        if !self.rows.contains(&entry.cell.row()) {
            self.rows.push(entry.cell.row());
        }
        self.written.push(entry);
    }

    pub(crate) fn push_failed(&mut self, entry: FailedEntry) {
        self.failed.push(entry);
    }

    /// A multi-line summary suitable for a chat reply or a terminal.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for w in &self.written {
            lines.push(format!(
                "OK {} {} {}{}",
                w.cell,
                w.label,
                format_amount(w.amount),
                w.currency
                    .as_deref()
                    .map(|c| format!(" {c}"))
                    .unwrap_or_default()
            ));
        }
        for f in &self.failed {
            lines.push(format!(
                "FAILED {} {}: {}",
                f.label,
                f.amount.map(format_amount).unwrap_or_default(),
                f.reason
            ));
        }
        if let Some(profit) = self.profit {
            lines.push(format!("Profit: {profit}"));
        }
        lines.join("\n")
    }
}
