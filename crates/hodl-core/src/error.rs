use thiserror::Error;

use crate::model::{EpochId, UserId};
use crate::points::Points;

/// Ledger-wide error types.
#[derive(Debug, Error)]
pub enum HodlError {
    /// Storage layer error (RocksDB open, read, write, commit).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A row lock could not be acquired in time, or the transaction lost a
    /// conflict. Safe to retry.
    #[error("Lock contention: {0}")]
    Contention(String),

    /// The balance oracle failed or timed out.
    #[error("Balance oracle error: {0}")]
    Oracle(String),

    /// Applying a delta would push a balance below zero.
    #[error("Balance of user {user} would become negative ({balance} - {debit})")]
    NegativeBalance {
        user: UserId,
        balance: Points,
        debit: Points,
    },

    /// No epoch exists yet; the scheduler has not created genesis.
    #[error("No current epoch")]
    NoCurrentEpoch,

    /// A referenced epoch does not exist.
    #[error("Epoch {0} does not exist")]
    MissingEpoch(EpochId),

    /// A UserEpochRecord for (user, epoch) already exists where a fresh one
    /// was required.
    #[error("Record for user {user} in epoch {epoch} already exists")]
    DuplicateRecord { user: UserId, epoch: EpochId },

    /// A textual amount could not be parsed as a fixed-point value.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// An inbound event was malformed.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration values.
    #[error("Config error: {0}")]
    Config(String),
}

impl HodlError {
    /// Whether the failure is transient: the caller may retry the same
    /// operation unchanged and expect it to succeed eventually.
    pub fn is_transient(&self) -> bool {
        matches!(self, HodlError::Contention(_) | HodlError::Oracle(_))
    }

    /// Whether the failure is a broken ledger invariant (as opposed to bad
    /// input or an infrastructure hiccup).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            HodlError::NegativeBalance { .. }
                | HodlError::NoCurrentEpoch
                | HodlError::MissingEpoch(_)
                | HodlError::DuplicateRecord { .. }
        )
    }
}

impl From<serde_json::Error> for HodlError {
    fn from(e: serde_json::Error) -> Self {
        HodlError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(HodlError::Contention("busy".into()).is_transient());
        assert!(HodlError::Oracle("timeout".into()).is_transient());
        assert!(!HodlError::NoCurrentEpoch.is_transient());
        assert!(!HodlError::Storage("io".into()).is_transient());
    }

    #[test]
    fn test_invariant_classification() {
        let err = HodlError::NegativeBalance {
            user: UserId(7),
            balance: Points::from_whole(1),
            debit: Points::from_whole(2),
        };
        assert!(err.is_invariant_violation());
        assert!(HodlError::DuplicateRecord {
            user: UserId(1),
            epoch: 1
        }
        .is_invariant_violation());
        assert!(!HodlError::InvalidEvent("x".into()).is_invariant_violation());
    }

    #[test]
    fn test_negative_balance_message() {
        let err = HodlError::NegativeBalance {
            user: UserId(7),
            balance: Points::from_whole(1),
            debit: "2.5".parse().unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "Balance of user 7 would become negative (1 - 2.5)"
        );
    }
}
