// crates/hodl-store/src/keys.rs
//
// Key layout:
//   - `user:{user_id}`                        -> JSON-serialized User
//   - `epoch:{epoch_id}`                      -> JSON-serialized Epoch
//   - `user_epoch:{epoch_id}:{user_id}`       -> JSON-serialized UserEpochRecord
//   - `meta:latest_epoch`                     -> JSON number, id of the newest epoch
//
// Ids are zero-padded to 20 digits so lexicographic key order equals numeric
// order. The record key embeds (epoch, user), which makes the pair unique by
// construction and groups an epoch's records under one prefix.

use hodl_core::{EpochId, UserId};

pub const USER_PREFIX: &str = "user:";
pub const EPOCH_PREFIX: &str = "epoch:";
pub const RECORD_PREFIX: &str = "user_epoch:";
pub const LATEST_EPOCH: &[u8] = b"meta:latest_epoch";

pub fn user(id: UserId) -> Vec<u8> {
    format!("{}{:020}", USER_PREFIX, id.0).into_bytes()
}

pub fn epoch(id: EpochId) -> Vec<u8> {
    format!("{}{:020}", EPOCH_PREFIX, id).into_bytes()
}

pub fn record(user: UserId, epoch: EpochId) -> Vec<u8> {
    format!("{}{:020}:{:020}", RECORD_PREFIX, epoch, user.0).into_bytes()
}

/// Prefix shared by every record of one epoch.
pub fn records_of_epoch(epoch: EpochId) -> Vec<u8> {
    format!("{}{:020}:", RECORD_PREFIX, epoch).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(user(UserId(42)), b"user:00000000000000000042".to_vec());
        assert_eq!(epoch(1), b"epoch:00000000000000000001".to_vec());
        assert_eq!(
            record(UserId(7), 3),
            b"user_epoch:00000000000000000003:00000000000000000007".to_vec()
        );
    }

    #[test]
    fn test_numeric_order_matches_key_order() {
        assert!(epoch(9) < epoch(10));
        assert!(user(UserId(99)) < user(UserId(100)));
        assert!(record(UserId(u64::MAX), 1) < record(UserId(0), 2));
    }

    #[test]
    fn test_epoch_prefix_covers_its_records_only() {
        let prefix = records_of_epoch(2);
        assert!(record(UserId(5), 2).starts_with(&prefix));
        assert!(!record(UserId(5), 20).starts_with(&prefix));
        // Users and epochs do not collide with each other.
        assert!(!user(UserId(1)).starts_with(EPOCH_PREFIX.as_bytes()));
        assert!(!record(UserId(1), 1).starts_with(USER_PREFIX.as_bytes()));
    }
}
