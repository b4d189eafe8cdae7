// crates/hodl-ledger/src/rewards.rs
//
// Read-side reward projection.
//
// For a user's record in an epoch:
//   staked_amount    = epoch_lowest_balance × portfolio_percentage
//   estimated_reward = epoch_lowest_balance × apy × portfolio_percentage
// Nothing here writes to the store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use hodl_core::error::HodlError;
use hodl_core::model::{Epoch, EpochId, StakingState, UserId};
use hodl_core::points::Points;
use hodl_store::LedgerStore;

/// Staked amount and reward derived from a low-water-mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewardProjection {
    pub staked_amount: Points,
    pub estimated_reward: Points,
}

/// Project the reward for `epoch_lowest_balance` under `epoch`'s rates.
pub fn project(epoch_lowest_balance: Points, epoch: &Epoch) -> RewardProjection {
    RewardProjection {
        staked_amount: epoch_lowest_balance.scaled(&[epoch.portfolio_percentage]),
        estimated_reward: epoch_lowest_balance.scaled(&[epoch.apy, epoch.portfolio_percentage]),
    }
}

/// Render the staking status block shown to a user.
pub fn display_staking_info(
    balance: Points,
    epoch_lowest_balance: Points,
    epoch: &Epoch,
    emoji: &str,
) -> String {
    let projection = project(epoch_lowest_balance, epoch);
    format!(
        "Your Points Balance: `{}`{emoji}\n\
         How many Points you are staking: `{}`{emoji}\n\
         When the Epoch ends: <t:{}>\n\
         Estimated Reward: `{}`{emoji}",
        balance.pretty(),
        projection.staked_amount.pretty(),
        epoch.end_at.timestamp(),
        projection.estimated_reward.pretty(),
        emoji = emoji,
    )
}

/// A user's standing in the current epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakingStatus {
    pub user_id: UserId,
    pub state: StakingState,
    pub balance: Points,
    pub epoch_id: EpochId,
    pub epoch_end: DateTime<Utc>,
    pub epoch_lowest_balance: Points,
    pub staked_amount: Points,
    pub estimated_reward: Points,
    #[serde(skip)]
    epoch: Epoch,
}

impl StakingStatus {
    /// Load the status of `user_id` in the epoch current at `now`.
    /// A user without a record in that epoch has a mark of 0.
    pub fn load(
        store: &LedgerStore,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self, HodlError> {
        let epoch = store.current_epoch(now)?.ok_or(HodlError::NoCurrentEpoch)?;
        let user = store
            .get_user(user_id)?
            .ok_or_else(|| HodlError::NotFound(format!("user {}", user_id)))?;
        let lowest = store
            .get_record(user_id, epoch.id)?
            .map(|r| r.epoch_lowest_balance)
            .unwrap_or(Points::ZERO);
        let projection = project(lowest, &epoch);

        Ok(Self {
            user_id,
            state: user.state(),
            balance: user.balance,
            epoch_id: epoch.id,
            epoch_end: epoch.end_at,
            epoch_lowest_balance: lowest,
            staked_amount: projection.staked_amount,
            estimated_reward: projection.estimated_reward,
            epoch,
        })
    }

    /// Human-readable block, as produced by `display_staking_info`.
    pub fn render(&self, emoji: &str) -> String {
        display_staking_info(self.balance, self.epoch_lowest_balance, &self.epoch, emoji)
    }
}
