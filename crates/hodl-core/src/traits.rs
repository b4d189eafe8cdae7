// crates/hodl-core/src/traits.rs

use async_trait::async_trait;

use crate::error::HodlError;
use crate::model::UserId;
use crate::points::Points;

/// External source of truth for a user's point balance.
///
/// Queried once, when the user opts in to staking. Implemented by the
/// daemon's HTTP client; tests use fixed in-memory oracles.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Fetch the current balance for `user`. Unknown users have balance 0.
    async fn balance(&self, user: UserId) -> Result<Points, HodlError>;
}

/// Sink for errors that the ledger cannot surface to a caller (scheduler
/// tick failures) or that operators should see regardless.
pub trait ErrorReporter: Send + Sync {
    /// Report an error that occurred while doing `context`.
    fn report(&self, context: &str, error: &HodlError);
}
