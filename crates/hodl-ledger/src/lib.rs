// crates/hodl-ledger/src/lib.rs
//
// hodl-ledger: the staking-epoch ledger components.
//
//   - `schedule`: pure epoch timing rules (genesis, successor, rollover window,
//     genesis grace).
//   - `epochs`: the Epoch Scheduler tick body. Creates genesis, rolls over to
//     the next epoch and seeds every user's record for it, all in one
//     transaction.
//   - `balance`: the Balance Update Engine. Applies transfer events and keeps
//     each staking user's epoch low-water-mark.
//   - `enrollment`: the Staking Enrollment Manager (opt in / opt out /
//     confirm).
//   - `rewards`: read-only reward projection and the staking status text.

pub mod balance;
pub mod enrollment;
pub mod epochs;
pub mod rewards;
pub mod schedule;

// Re-export key types for ergonomic access from downstream crates.
pub use balance::{BalanceChange, BalanceEngine, TransferOutcome};
pub use enrollment::{EnrollmentManager, EnrollmentOutcome};
pub use epochs::{EpochKeeper, EpochTick};
pub use rewards::{display_staking_info, project, RewardProjection, StakingStatus};
pub use schedule::EpochSchedule;
