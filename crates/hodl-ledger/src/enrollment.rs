// crates/hodl-ledger/src/enrollment.rs
//
// Staking Enrollment Manager.
//
// Per-user state machine:
//   NOT_STAKING --opt_in-->  STAKING      (balance refreshed from the oracle)
//   STAKING     --opt_out--> NOT_STAKING  (current epoch's reward forfeited)
//   STAKING     --confirm--> STAKING      (no change)
// Repeated opt-ins and confirms are absorbed as no-ops.
//
// Seeding on opt-in: during the genesis grace window the current epoch's
// record starts at the fetched balance; at any other time it starts at 0, so
// a mid-epoch entrant only earns from the next epoch on. An existing record
// is never overwritten by an opt-in.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use hodl_core::error::HodlError;
use hodl_core::event::{EnrollmentIntent, Intent};
use hodl_core::model::{EpochId, StakingState, User, UserEpochRecord, UserId};
use hodl_core::points::Points;
use hodl_core::traits::BalanceOracle;
use hodl_store::{LedgerStore, LockMode};

use crate::schedule::EpochSchedule;

/// Result of handling one enrollment intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentOutcome {
    pub user_id: UserId,
    pub from: StakingState,
    pub to: StakingState,
    /// Epoch whose record was seeded or forfeited, if any was touched.
    pub epoch_id: Option<EpochId>,
}

impl EnrollmentOutcome {
    fn unchanged(user_id: UserId, state: StakingState) -> Self {
        Self {
            user_id,
            from: state,
            to: state,
            epoch_id: None,
        }
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Governs staking on/off transitions.
pub struct EnrollmentManager {
    store: Arc<LedgerStore>,
    oracle: Arc<dyn BalanceOracle>,
    schedule: EpochSchedule,
}

impl EnrollmentManager {
    pub fn new(
        store: Arc<LedgerStore>,
        oracle: Arc<dyn BalanceOracle>,
        schedule: EpochSchedule,
    ) -> Self {
        Self {
            store,
            oracle,
            schedule,
        }
    }

    /// Dispatch an enrollment intent.
    pub async fn handle(
        &self,
        intent: &EnrollmentIntent,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentOutcome, HodlError> {
        match intent.intent {
            Intent::OptIn => self.opt_in(intent.user_id, now).await,
            Intent::OptOut => self.opt_out(intent.user_id, now),
            Intent::Confirm => self.confirm(intent.user_id),
        }
    }

    /// Start staking. The balance oracle is queried before any lock is taken;
    /// an oracle failure leaves the ledger untouched.
    pub async fn opt_in(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentOutcome, HodlError> {
        if let Some(user) = self.store.get_user(user_id)? {
            if user.is_staking {
                tracing::debug!(user = %user_id, "Opt-in from a staking user ignored");
                return Ok(EnrollmentOutcome::unchanged(user_id, StakingState::Staking));
            }
        }
        let balance = self.oracle.balance(user_id).await?;
        self.commit_opt_in(user_id, balance, now)
    }

    fn commit_opt_in(
        &self,
        user_id: UserId,
        balance: Points,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentOutcome, HodlError> {
        let txn = self.store.begin();
        let (current, latest) = txn.lock_current_epoch(LockMode::Shared, now)?;

        let mut user = txn
            .lock_user(user_id)?
            .unwrap_or_else(|| User::new(user_id, now));
        if user.is_staking {
            // Lost a race with a concurrent opt-in for the same user.
            return Ok(EnrollmentOutcome::unchanged(user_id, StakingState::Staking));
        }
        let from = user.state();
        user.balance = balance;
        user.is_staking = true;
        user.staking_started_at = Some(now);
        user.modified_at = now;
        txn.put_user(&user)?;

        let seed = if self.schedule.in_genesis_grace(&current, now) {
            balance
        } else {
            Points::ZERO
        };
        if txn.lock_record(user_id, current.id)?.is_none() {
            txn.put_record(&UserEpochRecord::new(user_id, current.id, seed, now))?;
        }

        // A look-ahead epoch has not started yet, so the user stakes for all
        // of it. Its rollover seed (0, as the user was idle) is replaced.
        for epoch_id in current.id + 1..=latest.id {
            match txn.lock_record(user_id, epoch_id)? {
                Some(mut record) => {
                    record.epoch_lowest_balance = balance;
                    record.modified_at = now;
                    txn.put_record(&record)?;
                }
                None => {
                    txn.put_record(&UserEpochRecord::new(user_id, epoch_id, balance, now))?
                }
            }
        }
        txn.commit()?;

        tracing::info!(
            user = %user_id,
            epoch = current.id,
            balance = %balance,
            seed = %seed,
            "User opted in to staking"
        );
        Ok(EnrollmentOutcome {
            user_id,
            from,
            to: StakingState::Staking,
            epoch_id: Some(current.id),
        })
    }

    /// Stop staking and forfeit the epoch in progress (and any look-ahead
    /// epoch). Safe to repeat. A user who was not staking only has existing
    /// records zeroed, so a later opt-in inside genesis grace still seeds
    /// from the live balance.
    pub fn opt_out(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentOutcome, HodlError> {
        let txn = self.store.begin();
        let (current, latest) = txn.lock_current_epoch(LockMode::Shared, now)?;

        let mut user = txn
            .lock_user(user_id)?
            .unwrap_or_else(|| User::new(user_id, now));
        let from = user.state();
        user.is_staking = false;
        user.staking_started_at = None;
        user.modified_at = now;
        txn.put_user(&user)?;

        for epoch_id in current.id..=latest.id {
            match txn.lock_record(user_id, epoch_id)? {
                Some(mut record) => {
                    if record.forfeit(now) {
                        txn.put_record(&record)?;
                    }
                }
                None if from == StakingState::Staking => {
                    txn.put_record(&UserEpochRecord::new(user_id, epoch_id, Points::ZERO, now))?
                }
                None => {}
            }
        }
        txn.commit()?;

        tracing::info!(user = %user_id, epoch = current.id, "User opted out of staking");
        Ok(EnrollmentOutcome {
            user_id,
            from,
            to: StakingState::NotStaking,
            epoch_id: Some(current.id),
        })
    }

    /// Acknowledge a "keep staking" answer. Purely informational.
    pub fn confirm(&self, user_id: UserId) -> Result<EnrollmentOutcome, HodlError> {
        let state = self
            .store
            .get_user(user_id)?
            .map(|u| u.state())
            .unwrap_or(StakingState::NotStaking);
        if state != StakingState::Staking {
            tracing::debug!(user = %user_id, "Confirm from a non-staking user ignored");
        }
        Ok(EnrollmentOutcome::unchanged(user_id, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_core::params::EpochParams;
    use hodl_store::StoreOptions;
    use uuid::Uuid;

    fn temp_db_path(label: &str) -> String {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("hodl_enroll_{}_{}", label, Uuid::now_v7()));
        path.to_string_lossy().to_string()
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl BalanceOracle for Unreachable {
        async fn balance(&self, _user: UserId) -> Result<Points, HodlError> {
            Err(HodlError::Oracle("connection refused".to_string()))
        }
    }

    fn manager(label: &str) -> (Arc<LedgerStore>, EnrollmentManager) {
        let store = Arc::new(
            LedgerStore::open_with(&temp_db_path(label), &StoreOptions::default()).unwrap(),
        );
        let manager = EnrollmentManager::new(
            store.clone(),
            Arc::new(Unreachable),
            EpochSchedule::new(EpochParams::default()),
        );
        (store, manager)
    }

    #[tokio::test]
    async fn test_opt_in_without_epoch_fails() {
        let (store, manager) = manager("no_epoch");
        let err = manager.commit_opt_in(UserId(1), Points::from_whole(5), Utc::now());
        assert!(matches!(err, Err(HodlError::NoCurrentEpoch)));
        assert!(store.get_user(UserId(1)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oracle_failure_leaves_user_untouched() {
        let (store, manager) = manager("oracle_down");
        let err = manager.opt_in(UserId(1), Utc::now()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.get_user(UserId(1)).unwrap().is_none());
    }

    #[test]
    fn test_confirm_unknown_user() {
        let (_store, manager) = manager("confirm");
        let outcome = manager.confirm(UserId(77)).unwrap();
        assert_eq!(outcome.to, StakingState::NotStaking);
        assert!(!outcome.changed());
    }
}
