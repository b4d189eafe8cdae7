// crates/hodl-daemon/src/shared.rs
//
// LedgerServices: the ledger components shared between the scheduler and
// the inbound event adapter.

use std::sync::Arc;

use hodl_core::error::HodlError;
use hodl_core::event::PointsLogParser;
use hodl_core::params::EpochParams;
use hodl_core::traits::{BalanceOracle, ErrorReporter};
use hodl_ledger::{BalanceEngine, EnrollmentManager, EpochKeeper, EpochSchedule};
use hodl_store::LedgerStore;

/// Ledger components built over one store.
pub struct LedgerServices {
    pub store: Arc<LedgerStore>,
    pub keeper: Arc<EpochKeeper>,
    pub engine: BalanceEngine,
    pub enrollment: EnrollmentManager,
    pub reporter: Arc<dyn ErrorReporter>,
    /// Emoji used in the staking status text.
    pub points_emoji: String,
    /// Parser for points-log messages, compiled for the configured marker.
    pub points_log: PointsLogParser,
}

impl LedgerServices {
    pub fn new(
        store: Arc<LedgerStore>,
        params: EpochParams,
        oracle: Arc<dyn BalanceOracle>,
        reporter: Arc<dyn ErrorReporter>,
        points_emoji: &str,
        points_marker: &str,
    ) -> Result<Self, HodlError> {
        let schedule = EpochSchedule::new(params);
        Ok(Self {
            keeper: Arc::new(EpochKeeper::new(store.clone(), schedule.clone())),
            engine: BalanceEngine::new(store.clone()),
            enrollment: EnrollmentManager::new(store.clone(), oracle, schedule),
            store,
            reporter,
            points_emoji: points_emoji.to_string(),
            points_log: PointsLogParser::new(points_marker)?,
        })
    }
}
