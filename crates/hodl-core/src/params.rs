// crates/hodl-core/src/params.rs
//
// Epoch lifecycle parameters. Read once at startup (the `[epochs]` table of
// the daemon config) and immutable thereafter.

use chrono::Duration;
use serde::Deserialize;

use crate::error::HodlError;
use crate::model::EpochId;
use crate::points::Rate;

/// Tunables for epoch creation, rollover, and genesis grace.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EpochParams {
    /// Length of every epoch.
    pub epoch_duration_days: u32,
    /// Gap between the end of one epoch and the start of the next.
    pub space_between_epochs_secs: u32,
    /// Scheduler tick interval. Rollover happens once the latest epoch ends
    /// within two intervals.
    pub check_epoch_minutes: u32,
    /// APY stamped on newly created epochs.
    pub default_apy: Rate,
    /// Portfolio percentage stamped on newly created epochs.
    pub default_portfolio_percentage: Rate,
    /// Id of the first epoch.
    pub genesis_epoch_id: EpochId,
    /// Opt-ins within this many days of genesis start are not penalised.
    pub penalties_free_days_for_genesis: u32,
}

impl Default for EpochParams {
    fn default() -> Self {
        Self {
            epoch_duration_days: 14,
            space_between_epochs_secs: 42,
            check_epoch_minutes: 15,
            default_apy: Rate::from_units(500),
            default_portfolio_percentage: Rate::from_units(2_000),
            genesis_epoch_id: 1,
            penalties_free_days_for_genesis: 2,
        }
    }
}

impl EpochParams {
    pub fn epoch_duration(&self) -> Duration {
        Duration::days(self.epoch_duration_days as i64)
    }

    pub fn space_between_epochs(&self) -> Duration {
        Duration::seconds(self.space_between_epochs_secs as i64)
    }

    /// Tick interval for the scheduler loop.
    pub fn check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.check_epoch_minutes as u64 * 60)
    }

    /// How long before the latest epoch ends the next one gets created.
    pub fn rollover_margin(&self) -> Duration {
        Duration::minutes(2 * self.check_epoch_minutes as i64)
    }

    pub fn genesis_grace(&self) -> Duration {
        Duration::days(self.penalties_free_days_for_genesis as i64)
    }

    /// Reject parameter sets that would break the epoch chain.
    pub fn validate(&self) -> Result<(), HodlError> {
        if self.epoch_duration_days == 0 {
            return Err(HodlError::Config(
                "epoch_duration_days must be positive".to_string(),
            ));
        }
        if self.check_epoch_minutes == 0 {
            return Err(HodlError::Config(
                "check_epoch_minutes must be positive".to_string(),
            ));
        }
        if self.rollover_margin() >= self.epoch_duration() {
            return Err(HodlError::Config(format!(
                "rollover margin of {} minutes must be shorter than an epoch ({} days)",
                2 * self.check_epoch_minutes,
                self.epoch_duration_days
            )));
        }
        if self.default_apy > Rate::ONE {
            return Err(HodlError::Config(format!(
                "default_apy must be at most 1, got {}",
                self.default_apy
            )));
        }
        if self.default_portfolio_percentage > Rate::ONE {
            return Err(HodlError::Config(format!(
                "default_portfolio_percentage must be at most 1, got {}",
                self.default_portfolio_percentage
            )));
        }
        if self.genesis_epoch_id == 0 {
            return Err(HodlError::Config(
                "genesis_epoch_id must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
