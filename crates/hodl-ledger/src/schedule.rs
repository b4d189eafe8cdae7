// crates/hodl-ledger/src/schedule.rs
//
// Epoch timing rules.
//
// Epochs form a chain: genesis starts when the scheduler first runs, every
// epoch lasts `epoch_duration_days`, and epoch N+1 starts
// `space_between_epochs_secs` after epoch N ends. The next epoch is created
// ahead of time, once the latest one ends within two scheduler intervals, so
// a late or skipped tick never leaves the ledger without a current epoch.

use chrono::{DateTime, Utc};

use hodl_core::model::Epoch;
use hodl_core::params::EpochParams;

/// Stateless timing rules derived from `EpochParams`.
#[derive(Debug, Clone)]
pub struct EpochSchedule {
    params: EpochParams,
}

impl EpochSchedule {
    pub fn new(params: EpochParams) -> Self {
        Self { params }
    }

    /// The first epoch: starts at `now`.
    pub fn genesis(&self, now: DateTime<Utc>) -> Epoch {
        Epoch {
            id: self.params.genesis_epoch_id,
            start_at: now,
            end_at: now + self.params.epoch_duration(),
            apy: self.params.default_apy,
            portfolio_percentage: self.params.default_portfolio_percentage,
            created_at: now,
        }
    }

    /// The epoch following `previous`, chained off its end.
    pub fn successor(&self, previous: &Epoch, now: DateTime<Utc>) -> Epoch {
        let start_at = previous.end_at + self.params.space_between_epochs();
        Epoch {
            id: previous.id + 1,
            start_at,
            end_at: start_at + self.params.epoch_duration(),
            apy: self.params.default_apy,
            portfolio_percentage: self.params.default_portfolio_percentage,
            created_at: now,
        }
    }

    /// Whether `latest` ends soon enough that its successor must be created.
    pub fn is_too_close(&self, latest: &Epoch, now: DateTime<Utc>) -> bool {
        latest.end_at - self.params.rollover_margin() < now
    }

    /// Whether an opt-in at `now` into `epoch` is penalty free: only during
    /// the first `penalties_free_days_for_genesis` days of genesis.
    pub fn in_genesis_grace(&self, epoch: &Epoch, now: DateTime<Utc>) -> bool {
        epoch.id == self.params.genesis_epoch_id && now < epoch.start_at + self.params.genesis_grace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn schedule() -> EpochSchedule {
        EpochSchedule::new(EpochParams::default())
    }

    #[test]
    fn test_genesis_bounds() {
        let g = schedule().genesis(t0());
        assert_eq!(g.id, 1);
        assert_eq!(g.start_at, t0());
        assert_eq!(g.end_at, t0() + Duration::days(14));
        assert_eq!(g.apy.to_string(), "0.05");
        assert_eq!(g.portfolio_percentage.to_string(), "0.2");
    }

    #[test]
    fn test_successor_chain() {
        let s = schedule();
        let g = s.genesis(t0());
        let e2 = s.successor(&g, t0() + Duration::days(13));
        let e3 = s.successor(&e2, t0() + Duration::days(27));
        assert_eq!(e2.id, 2);
        assert_eq!(e2.start_at, g.end_at + Duration::seconds(42));
        assert_eq!(e2.end_at, e2.start_at + Duration::days(14));
        assert_eq!(e3.start_at, e2.end_at + Duration::seconds(42));
        assert_eq!(e3.id, 3);
    }

    #[test]
    fn test_is_too_close_window() {
        let s = schedule();
        let g = s.genesis(t0());
        let boundary = g.end_at - Duration::minutes(30);
        assert!(!s.is_too_close(&g, t0()));
        assert!(!s.is_too_close(&g, boundary));
        assert!(s.is_too_close(&g, boundary + Duration::seconds(1)));
        // 13.98 days in.
        assert!(s.is_too_close(&g, t0() + Duration::seconds(1_207_872)));
        // Long after the end, still too close (a missed rollover catches up).
        assert!(s.is_too_close(&g, g.end_at + Duration::days(3)));
    }

    #[test]
    fn test_genesis_grace() {
        let s = schedule();
        let g = s.genesis(t0());
        assert!(s.in_genesis_grace(&g, t0()));
        assert!(s.in_genesis_grace(&g, t0() + Duration::days(2) - Duration::seconds(1)));
        assert!(!s.in_genesis_grace(&g, t0() + Duration::days(2)));

        let e2 = s.successor(&g, t0());
        assert!(!s.in_genesis_grace(&e2, e2.start_at));
    }
}
