// crates/hodl-core/src/lib.rs
//
// hodl-core: Core types, fixed-point amounts, events, and traits for the
// HODL staking ledger.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the persisted records (users, epochs, per-user-per-epoch
// low-water-marks), the error type, the inbound event shapes, and the trait
// seams for the external balance oracle and error reporting sink.

pub mod error;
pub mod event;
pub mod model;
pub mod params;
pub mod points;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use hodl_core::Points;`

// Amounts
pub use points::{Points, Rate, UNITS_PER_POINT};

// Records
pub use model::{Epoch, EpochId, StakingState, User, UserEpochRecord, UserId};

// Configuration
pub use params::EpochParams;

// Inbound events
pub use event::{EnrollmentIntent, Intent, PointsLogParser, TransferEvent};

// Error type
pub use error::HodlError;

// Traits
pub use traits::{BalanceOracle, ErrorReporter};
