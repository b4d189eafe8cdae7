// crates/hodl-ledger/src/balance.rs
//
// Balance Update Engine.
//
// A transfer debits the sender once and credits every receiver by the same
// amount, but only for parties that are staking; other parties are merely
// registered. All affected rows of one event are updated in one transaction:
//
//   1. take the latest-epoch pointer shared (blocks a concurrent rollover,
//      not other transfers);
//   2. lock each participant's user row, in ascending id order so two
//      overlapping transfers can never deadlock;
//   3. apply the participant's net delta, rejecting a negative result;
//   4. lower (or create) the participant's record for the current epoch and
//      for any look-ahead epoch already created by a rollover.
//
// Tie-breaks: a receiver mentioned several times is credited once, and a
// sender who is also a receiver gets the net of debit and credit (zero for a
// single amount) with no intermediate dip recorded.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use hodl_core::error::HodlError;
use hodl_core::event::TransferEvent;
use hodl_core::model::{EpochId, User, UserEpochRecord, UserId};
use hodl_core::points::Points;
use hodl_store::{LedgerStore, LedgerTxn, LockMode};

/// Net change for one participant of a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Delta {
    credit: Points,
    debit: Points,
}

impl Delta {
    /// Apply to `balance`. Credits land before debits, so only the net
    /// result has to be non-negative.
    fn apply(&self, user: UserId, balance: Points) -> Result<Points, HodlError> {
        let credited = balance.checked_add(self.credit).ok_or_else(|| {
            HodlError::InvalidAmount(format!("balance of user {} overflows", user))
        })?;
        credited
            .checked_sub(self.debit)
            .ok_or(HodlError::NegativeBalance {
                user,
                balance: credited,
                debit: self.debit,
            })
    }
}

/// Collapse a transfer into one delta per distinct participant, ordered by id.
fn net_deltas(sender: UserId, receivers: &[UserId], amount: Points) -> BTreeMap<UserId, Delta> {
    let mut deltas: BTreeMap<UserId, Delta> = BTreeMap::new();
    deltas.entry(sender).or_default().debit = amount;
    for receiver in receivers {
        deltas.entry(*receiver).or_default().credit = amount;
    }
    deltas
}

/// A staking participant's state after a transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceChange {
    pub user_id: UserId,
    pub balance: Points,
    /// Low-water-mark in the epoch the transfer was applied to.
    pub epoch_lowest_balance: Points,
}

/// Result of applying one transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOutcome {
    pub epoch_id: EpochId,
    /// Staking participants whose balance was updated. Non-staking parties
    /// are not listed.
    pub changes: Vec<BalanceChange>,
}

/// Applies transfers and maintains epoch low-water-marks.
pub struct BalanceEngine {
    store: Arc<LedgerStore>,
}

impl BalanceEngine {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Apply a parsed transfer event against the epoch current at `now`.
    pub fn apply_event(
        &self,
        event: &TransferEvent,
        now: DateTime<Utc>,
    ) -> Result<TransferOutcome, HodlError> {
        let epoch = self
            .store
            .current_epoch(now)?
            .ok_or(HodlError::NoCurrentEpoch)?;
        self.apply_transfer(
            event.sender_id,
            &event.receiver_ids,
            event.amount,
            epoch.id,
            now,
        )
    }

    /// Apply one transfer atomically.
    ///
    /// Fails with `MissingEpoch` if `current_epoch_id` does not exist,
    /// `NegativeBalance` if the sender cannot cover the debit, and
    /// `Contention` if a row lock could not be taken in time. On any error
    /// nothing is written.
    pub fn apply_transfer(
        &self,
        sender_id: UserId,
        receiver_ids: &[UserId],
        amount: Points,
        current_epoch_id: EpochId,
        now: DateTime<Utc>,
    ) -> Result<TransferOutcome, HodlError> {
        let txn = self.store.begin();
        let latest = txn
            .lock_latest_epoch_id(LockMode::Shared)?
            .ok_or(HodlError::NoCurrentEpoch)?;
        if current_epoch_id > latest || txn.get_epoch(current_epoch_id)?.is_none() {
            return Err(HodlError::MissingEpoch(current_epoch_id));
        }

        let mut changes = Vec::new();
        for (user_id, delta) in net_deltas(sender_id, receiver_ids, amount) {
            let mut user = match txn.lock_user(user_id)? {
                Some(user) => user,
                None => {
                    // First sighting: register as not staking, balance untouched.
                    txn.put_user(&User::new(user_id, now))?;
                    continue;
                }
            };
            if !user.is_staking {
                continue;
            }

            user.balance = delta.apply(user_id, user.balance)?;
            user.modified_at = now;
            txn.put_user(&user)?;

            let mut lowest = user.balance;
            for epoch_id in current_epoch_id..=latest {
                let mark = lower_mark(&txn, user_id, epoch_id, user.balance, now)?;
                if epoch_id == current_epoch_id {
                    lowest = mark;
                }
            }
            changes.push(BalanceChange {
                user_id,
                balance: user.balance,
                epoch_lowest_balance: lowest,
            });
        }
        txn.commit()?;

        tracing::debug!(
            sender = %sender_id,
            receivers = receiver_ids.len(),
            amount = %amount,
            epoch = current_epoch_id,
            updated = changes.len(),
            "Transfer applied"
        );
        Ok(TransferOutcome {
            epoch_id: current_epoch_id,
            changes,
        })
    }
}

/// Upsert the (user, epoch) record so its mark is at most `balance`.
/// Returns the resulting mark.
fn lower_mark(
    txn: &LedgerTxn<'_>,
    user_id: UserId,
    epoch_id: EpochId,
    balance: Points,
    now: DateTime<Utc>,
) -> Result<Points, HodlError> {
    match txn.lock_record(user_id, epoch_id)? {
        Some(mut record) => {
            if record.lower_to(balance, now) {
                txn.put_record(&record)?;
            }
            Ok(record.epoch_lowest_balance)
        }
        None => {
            txn.put_record(&UserEpochRecord::new(user_id, epoch_id, balance, now))?;
            Ok(balance)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(n: u64) -> Points {
        Points::from_whole(n)
    }

    #[test]
    fn test_net_deltas_dedups_receivers() {
        let deltas = net_deltas(UserId(1), &[UserId(2), UserId(2), UserId(3)], pts(5));
        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[&UserId(1)], Delta { credit: Points::ZERO, debit: pts(5) });
        assert_eq!(deltas[&UserId(2)], Delta { credit: pts(5), debit: Points::ZERO });
    }

    #[test]
    fn test_net_deltas_self_transfer() {
        let deltas = net_deltas(UserId(1), &[UserId(1)], pts(5));
        assert_eq!(deltas.len(), 1);
        let d = deltas[&UserId(1)];
        assert_eq!(d.apply(UserId(1), pts(2)).unwrap(), pts(2));
    }

    #[test]
    fn test_net_deltas_sorted_for_lock_order() {
        let deltas = net_deltas(UserId(9), &[UserId(3), UserId(7)], pts(1));
        let ids: Vec<u64> = deltas.keys().map(|u| u.0).collect();
        assert_eq!(ids, vec![3, 7, 9]);
    }

    #[test]
    fn test_delta_rejects_negative() {
        let d = Delta { credit: Points::ZERO, debit: pts(10) };
        let err = d.apply(UserId(4), pts(3)).unwrap_err();
        assert!(matches!(err, HodlError::NegativeBalance { .. }));
        assert_eq!(d.apply(UserId(4), pts(10)).unwrap(), Points::ZERO);
    }
}
