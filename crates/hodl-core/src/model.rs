// crates/hodl-core/src/model.rs
//
// Persisted records: users, epochs, and the per-user-per-epoch
// low-water-mark record that joins them.
//
// Relationships are explicit foreign keys (`user_id`, `epoch_id`) on
// `UserEpochRecord`; the store enforces uniqueness on (user_id, epoch_id).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HodlError;
use crate::points::{Points, Rate};

/// Sequential epoch number. Genesis is 1.
pub type EpochId = u64;

/// Opaque, stable user identity (a chat-platform snowflake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = HodlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(UserId)
            .map_err(|_| HodlError::InvalidEvent(format!("invalid user id: {:?}", s)))
    }
}

/// Staking enrollment state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingState {
    /// Initial state for every newly observed user.
    NotStaking,
    Staking,
}

impl fmt::Display for StakingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakingState::NotStaking => write!(f, "NOT_STAKING"),
            StakingState::Staking => write!(f, "STAKING"),
        }
    }
}

/// A ledger participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Current balance. Never negative.
    pub balance: Points,
    pub is_staking: bool,
    /// Set while staking, cleared on opt-out.
    pub staking_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl User {
    /// A freshly observed user: zero balance, not staking.
    pub fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            balance: Points::ZERO,
            is_staking: false,
            staking_started_at: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn state(&self) -> StakingState {
        if self.is_staking {
            StakingState::Staking
        } else {
            StakingState::NotStaking
        }
    }
}

/// A fixed-duration staking period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    pub id: EpochId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// APY for this epoch (0.05 means 5%).
    pub apy: Rate,
    /// Part of the low-water-mark counted as staked (0.2 means 20%).
    pub portfolio_percentage: Rate,
    pub created_at: DateTime<Utc>,
}

impl Epoch {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch #{}", self.id)
    }
}

/// The low-water-mark of one user in one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEpochRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub epoch_id: EpochId,
    /// Lowest balance held while staking during the epoch; basis for rewards.
    pub epoch_lowest_balance: Points,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl UserEpochRecord {
    pub fn new(user_id: UserId, epoch_id: EpochId, seed: Points, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            epoch_id,
            epoch_lowest_balance: seed,
            created_at: now,
            modified_at: now,
        }
    }

    /// Lower the mark to `balance` if it is below the current mark.
    /// Returns `true` when the record changed.
    pub fn lower_to(&mut self, balance: Points, now: DateTime<Utc>) -> bool {
        if balance < self.epoch_lowest_balance {
            self.epoch_lowest_balance = balance;
            self.modified_at = now;
            true
        } else {
            false
        }
    }

    /// Force the mark to zero (reward forfeiture). Returns `true` when the
    /// record changed.
    pub fn forfeit(&mut self, now: DateTime<Utc>) -> bool {
        self.lower_to(Points::ZERO, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_user_is_not_staking() {
        let user = User::new(UserId(42), Utc::now());
        assert_eq!(user.state(), StakingState::NotStaking);
        assert_eq!(user.balance, Points::ZERO);
        assert!(user.staking_started_at.is_none());
    }

    #[test]
    fn test_lower_to_never_raises() {
        let now = Utc::now();
        let mut rec = UserEpochRecord::new(UserId(1), 1, Points::from_whole(100), now);
        assert!(rec.lower_to(Points::from_whole(60), now));
        assert!(!rec.lower_to(Points::from_whole(90), now));
        assert!(!rec.lower_to(Points::from_whole(60), now));
        assert_eq!(rec.epoch_lowest_balance, Points::from_whole(60));
        assert!(rec.forfeit(now));
        assert!(!rec.forfeit(now));
        assert_eq!(rec.epoch_lowest_balance, Points::ZERO);
    }

    #[test]
    fn test_epoch_has_started() {
        let start = Utc::now();
        let epoch = Epoch {
            id: 1,
            start_at: start,
            end_at: start + Duration::days(14),
            apy: Rate::from_units(500),
            portfolio_percentage: Rate::from_units(2_000),
            created_at: start,
        };
        assert!(epoch.has_started(start));
        assert!(epoch.has_started(start + Duration::days(14)));
        assert!(!epoch.has_started(start - Duration::seconds(1)));
        assert_eq!(epoch.to_string(), "Epoch #1");
    }

    #[test]
    fn test_user_id_parse() {
        assert_eq!("819648258112225316".parse::<UserId>().unwrap(), UserId(819648258112225316));
        assert!("abc".parse::<UserId>().is_err());
    }

    #[test]
    fn test_staking_state_serde() {
        let json = serde_json::to_string(&StakingState::NotStaking).unwrap();
        assert_eq!(json, "\"not_staking\"");
    }
}
