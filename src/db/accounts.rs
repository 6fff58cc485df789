//! Types for tracked accounts.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an account record.
///
/// `Pending` rows are claimed by the worker loop; `Done` and `Failed` are
/// terminal and never re-queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Pending,
    Done,
    Failed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "Pending",
            AccountStatus::Done => "Done",
            AccountStatus::Failed => "Failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(AccountStatus::Pending),
            "Done" => Some(AccountStatus::Done),
            "Failed" => Some(AccountStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AccountStatus::Done | AccountStatus::Failed)
    }
}

/// An account row as stored.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub status: AccountStatus,
}

/// A row staged for insertion by the importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub username: String,
}

/// Per-status row counts, for end-of-run tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub done: i64,
    pub failed: i64,
}
