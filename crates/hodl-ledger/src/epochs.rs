// crates/hodl-ledger/src/epochs.rs
//
// Epoch Scheduler tick body.
//
// A tick first checks the latest epoch without locks and stops there unless
// there is work to do. Otherwise, in a single transaction holding the
// latest-epoch pointer exclusively:
//   1. no epoch yet           -> create genesis;
//   2. latest ends too soon   -> create the successor and seed one record per
//                                user (staking: current balance, otherwise 0);
//   3. otherwise              -> nothing (the transaction is discarded).
// Either the new epoch and all its records commit together or nothing does,
// so a failed tick leaves no partial state and the next tick simply re-runs
// the same check against the latest persisted epoch.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use hodl_core::error::HodlError;
use hodl_core::model::{Epoch, UserEpochRecord};
use hodl_core::points::Points;
use hodl_store::{LedgerStore, LockMode};

use crate::schedule::EpochSchedule;

/// What a scheduler tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum EpochTick {
    /// The genesis epoch was created.
    Genesis(Epoch),
    /// A new epoch was created and seeded.
    RolledOver {
        epoch: Epoch,
        /// Records seeded with the user's balance.
        staking_users: usize,
        /// Records seeded with zero.
        idle_users: usize,
    },
    /// The latest epoch is not near its end yet.
    Unchanged(Epoch),
}

/// Keeps exactly one current epoch in the store.
pub struct EpochKeeper {
    store: Arc<LedgerStore>,
    schedule: EpochSchedule,
}

impl EpochKeeper {
    pub fn new(store: Arc<LedgerStore>, schedule: EpochSchedule) -> Self {
        Self { store, schedule }
    }

    /// Ensure a current epoch exists and roll over to the next one if the
    /// latest epoch ends within the rollover margin.
    pub fn check_increment_epoch(&self, now: DateTime<Utc>) -> Result<EpochTick, HodlError> {
        // Most ticks have nothing to do; decide that without blocking writers.
        if let Some(latest) = self.store.latest_epoch()? {
            if !self.schedule.is_too_close(&latest, now) {
                tracing::trace!(epoch = latest.id, "Latest epoch not near its end");
                return Ok(EpochTick::Unchanged(latest));
            }
        }

        let txn = self.store.begin();
        let latest = txn.lock_latest_epoch(LockMode::Exclusive)?;

        let latest = match latest {
            None => {
                let genesis = self.schedule.genesis(now);
                txn.insert_epoch(&genesis)?;
                txn.commit()?;
                tracing::info!(
                    epoch = genesis.id,
                    end = %genesis.end_at,
                    "Genesis epoch created"
                );
                return Ok(EpochTick::Genesis(genesis));
            }
            Some(latest) => latest,
        };

        // Re-check under the lock: a concurrent tick may have rolled over.
        if !self.schedule.is_too_close(&latest, now) {
            return Ok(EpochTick::Unchanged(latest));
        }

        let next = self.schedule.successor(&latest, now);
        txn.insert_epoch(&next)?;

        let mut staking_users = 0;
        let mut idle_users = 0;
        for user in txn.users()? {
            let seed = if user.is_staking {
                staking_users += 1;
                user.balance
            } else {
                idle_users += 1;
                Points::ZERO
            };
            txn.insert_record(&UserEpochRecord::new(user.id, next.id, seed, now))?;
        }
        txn.commit()?;

        tracing::info!(
            epoch = next.id,
            start = %next.start_at,
            end = %next.end_at,
            staking_users,
            idle_users,
            "Epoch rolled over"
        );
        Ok(EpochTick::RolledOver {
            epoch: next,
            staking_users,
            idle_users,
        })
    }
}
