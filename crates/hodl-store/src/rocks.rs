// crates/hodl-store/src/rocks.rs
//
// RocksDB-backed Ledger Store.
//
// The database is a pessimistic `TransactionDB`. Every mutation runs inside a
// `LedgerTxn`:
//   - user and record rows are locked exclusively with `get_for_update`
//     before they are read-modified-written;
//   - the latest-epoch pointer is locked shared by transfers and enrollments
//     and exclusively by epoch creation, so a rollover never interleaves with
//     a balance mutation while balance mutations still run concurrently with
//     each other;
//   - lock waits are bounded by `StoreOptions::lock_timeout_ms`; a timeout
//     or detected deadlock surfaces as `HodlError::Contention`.
// Dropping a `LedgerTxn` without committing rolls it back.

use chrono::{DateTime, Utc};
use rocksdb::{
    ErrorKind, MultiThreaded, Options, Transaction, TransactionDB, TransactionDBOptions,
    TransactionOptions, WriteOptions,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use hodl_core::error::HodlError;
use hodl_core::model::{Epoch, EpochId, User, UserEpochRecord, UserId};

use crate::keys;

type Db = TransactionDB<MultiThreaded>;

/// Tuning for the transactional store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Upper bound on any single lock wait, in milliseconds.
    pub lock_timeout_ms: i64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 1_000,
        }
    }
}

/// How a row lock is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders at once; blocks exclusive acquirers.
    Shared,
    /// Single holder.
    Exclusive,
}

/// The persistent ledger: users, epochs, and user-epoch records.
pub struct LedgerStore {
    db: Db,
    path: String,
    lock_timeout_ms: i64,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("path", &self.path)
            .field("lock_timeout_ms", &self.lock_timeout_ms)
            .finish()
    }
}

impl LedgerStore {
    /// Open a ledger database at the given filesystem path with default options.
    ///
    /// Creates the database directory if it does not exist.
    pub fn open(path: &str) -> Result<Self, HodlError> {
        Self::open_with(path, &StoreOptions::default())
    }

    /// Open a ledger database with explicit options.
    pub fn open_with(path: &str, options: &StoreOptions) -> Result<Self, HodlError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(options.lock_timeout_ms);
        txn_db_opts.set_default_lock_timeout(options.lock_timeout_ms);

        let db = Db::open(&opts, &txn_db_opts, path)
            .map_err(|e| HodlError::Storage(format!("Failed to open RocksDB at {}: {}", path, e)))?;

        tracing::debug!("Ledger store opened at {}", path);
        Ok(Self {
            db,
            path: path.to_string(),
            lock_timeout_ms: options.lock_timeout_ms,
        })
    }

    /// Start a new transaction. Nothing is visible to others until `commit`.
    pub fn begin(&self) -> LedgerTxn<'_> {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_lock_timeout(self.lock_timeout_ms);
        txn_opts.set_deadlock_detect(true);
        LedgerTxn {
            txn: self.db.transaction_opt(&WriteOptions::default(), &txn_opts),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, HodlError> {
        match self.db.get(key).map_err(|e| map_rocks("get", e))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>, HodlError> {
        let mut out = Vec::new();
        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item.map_err(|e| map_rocks("iterate", e))?;
            // Without a prefix extractor the iterator runs past the prefix.
            if !key.starts_with(prefix) {
                break;
            }
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>, HodlError> {
        self.get_json(&keys::user(id))
    }

    pub fn get_epoch(&self, id: EpochId) -> Result<Option<Epoch>, HodlError> {
        self.get_json(&keys::epoch(id))
    }

    pub fn get_record(
        &self,
        user: UserId,
        epoch: EpochId,
    ) -> Result<Option<UserEpochRecord>, HodlError> {
        self.get_json(&keys::record(user, epoch))
    }

    /// The newest epoch by id, if genesis exists.
    pub fn latest_epoch(&self) -> Result<Option<Epoch>, HodlError> {
        match self.get_json::<EpochId>(keys::LATEST_EPOCH)? {
            Some(id) => self.get_epoch(id),
            None => Ok(None),
        }
    }

    /// The epoch that is current at `now`. See `resolve_current`.
    pub fn current_epoch(&self, now: DateTime<Utc>) -> Result<Option<Epoch>, HodlError> {
        match self.latest_epoch()? {
            Some(latest) => resolve_current(latest, now, |id| self.get_epoch(id)).map(Some),
            None => Ok(None),
        }
    }

    /// All epochs in ascending id order.
    pub fn list_epochs(&self) -> Result<Vec<Epoch>, HodlError> {
        self.scan_json(keys::EPOCH_PREFIX.as_bytes())
    }

    /// All users in ascending id order.
    pub fn list_users(&self) -> Result<Vec<User>, HodlError> {
        self.scan_json(keys::USER_PREFIX.as_bytes())
    }

    /// Every record of one epoch, in ascending user id order.
    pub fn records_for_epoch(&self, epoch: EpochId) -> Result<Vec<UserEpochRecord>, HodlError> {
        self.scan_json(&keys::records_of_epoch(epoch))
    }
}

/// Pick the current epoch given the latest one.
///
/// The latest epoch is current once it has started. Before that (the
/// look-ahead window after a rollover, including the inter-epoch gap) the
/// previous epoch is current. If there is no previous epoch the latest one is
/// returned.
fn resolve_current<F>(latest: Epoch, now: DateTime<Utc>, get: F) -> Result<Epoch, HodlError>
where
    F: FnOnce(EpochId) -> Result<Option<Epoch>, HodlError>,
{
    if latest.has_started(now) {
        return Ok(latest);
    }
    let previous = match latest.id.checked_sub(1) {
        Some(id) => get(id)?,
        None => None,
    };
    Ok(previous.unwrap_or(latest))
}

/// A pessimistic transaction over the ledger.
pub struct LedgerTxn<'db> {
    txn: Transaction<'db, Db>,
}

impl<'db> LedgerTxn<'db> {
    fn read_json<T: DeserializeOwned>(
        &self,
        key: &[u8],
        lock: Option<LockMode>,
    ) -> Result<Option<T>, HodlError> {
        let raw = match lock {
            Some(mode) => self
                .txn
                .get_for_update(key, mode == LockMode::Exclusive)
                .map_err(|e| map_rocks("lock", e))?,
            None => self.txn.get(key).map_err(|e| map_rocks("get", e))?,
        };
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_json<T: Serialize>(&self, key: &[u8], value: &T) -> Result<(), HodlError> {
        let json = serde_json::to_vec(value)?;
        self.txn.put(key, json).map_err(|e| map_rocks("put", e))
    }

    /// Read the latest epoch id while locking the pointer.
    ///
    /// Balance mutations take it `Shared`; epoch creation takes it `Exclusive`.
    /// The lock is taken even when no epoch exists yet.
    pub fn lock_latest_epoch_id(&self, mode: LockMode) -> Result<Option<EpochId>, HodlError> {
        self.read_json(keys::LATEST_EPOCH, Some(mode))
    }

    /// Lock the latest-epoch pointer and load the epoch it names.
    pub fn lock_latest_epoch(&self, mode: LockMode) -> Result<Option<Epoch>, HodlError> {
        match self.lock_latest_epoch_id(mode)? {
            Some(id) => Ok(Some(
                self.get_epoch(id)?.ok_or(HodlError::MissingEpoch(id))?,
            )),
            None => Ok(None),
        }
    }

    /// Lock the pointer and resolve the epoch current at `now` together with
    /// the latest epoch (which differ only inside the look-ahead window).
    pub fn lock_current_epoch(
        &self,
        mode: LockMode,
        now: DateTime<Utc>,
    ) -> Result<(Epoch, Epoch), HodlError> {
        let latest = self.lock_latest_epoch(mode)?.ok_or(HodlError::NoCurrentEpoch)?;
        let current = resolve_current(latest.clone(), now, |id| self.get_epoch(id))?;
        Ok((current, latest))
    }

    /// Epochs are immutable once created, so this read takes no lock.
    pub fn get_epoch(&self, id: EpochId) -> Result<Option<Epoch>, HodlError> {
        self.read_json(&keys::epoch(id), None)
    }

    /// Insert a new epoch and advance the latest-epoch pointer.
    ///
    /// The caller must hold the pointer exclusively. The new id must be the
    /// successor of the current latest id (or any id for genesis), and must
    /// not exist yet.
    pub fn insert_epoch(&self, epoch: &Epoch) -> Result<(), HodlError> {
        let latest = self.lock_latest_epoch_id(LockMode::Exclusive)?;
        if let Some(latest) = latest {
            if epoch.id != latest + 1 {
                return Err(HodlError::Storage(format!(
                    "epoch {} does not follow latest epoch {}",
                    epoch.id, latest
                )));
            }
        }
        if self.get_epoch(epoch.id)?.is_some() {
            return Err(HodlError::Storage(format!("epoch {} already exists", epoch.id)));
        }
        if epoch.end_at <= epoch.start_at {
            return Err(HodlError::Storage(format!(
                "epoch {} ends before it starts",
                epoch.id
            )));
        }
        self.write_json(&keys::epoch(epoch.id), epoch)?;
        self.write_json(keys::LATEST_EPOCH, &epoch.id)
    }

    /// Load and exclusively lock a user row.
    pub fn lock_user(&self, id: UserId) -> Result<Option<User>, HodlError> {
        self.read_json(&keys::user(id), Some(LockMode::Exclusive))
    }

    pub fn put_user(&self, user: &User) -> Result<(), HodlError> {
        self.write_json(&keys::user(user.id), user)
    }

    /// Every user, read inside the transaction without row locks.
    ///
    /// Only consistent as a snapshot while the latest-epoch pointer is held
    /// exclusively, since every user mutation holds it shared.
    pub fn users(&self) -> Result<Vec<User>, HodlError> {
        let prefix = keys::USER_PREFIX.as_bytes();
        let mut out = Vec::new();
        for item in self.txn.prefix_iterator(prefix) {
            let (key, value) = item.map_err(|e| map_rocks("iterate", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Load and exclusively lock a (user, epoch) record row.
    pub fn lock_record(
        &self,
        user: UserId,
        epoch: EpochId,
    ) -> Result<Option<UserEpochRecord>, HodlError> {
        self.read_json(&keys::record(user, epoch), Some(LockMode::Exclusive))
    }

    /// Write a record, replacing any existing one for the same pair.
    pub fn put_record(&self, record: &UserEpochRecord) -> Result<(), HodlError> {
        self.write_json(&keys::record(record.user_id, record.epoch_id), record)
    }

    /// Write a record that must not exist yet.
    pub fn insert_record(&self, record: &UserEpochRecord) -> Result<(), HodlError> {
        if self.lock_record(record.user_id, record.epoch_id)?.is_some() {
            return Err(HodlError::DuplicateRecord {
                user: record.user_id,
                epoch: record.epoch_id,
            });
        }
        self.put_record(record)
    }

    /// Commit all writes atomically and release every lock.
    pub fn commit(self) -> Result<(), HodlError> {
        self.txn.commit().map_err(|e| map_rocks("commit", e))
    }
}

/// Map a RocksDB error: lock timeouts, deadlocks and busy statuses are
/// transient contention, everything else is a storage failure.
fn map_rocks(op: &str, e: rocksdb::Error) -> HodlError {
    match e.kind() {
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
            HodlError::Contention(format!("RocksDB {} failed: {}", op, e))
        }
        _ => HodlError::Storage(format!("RocksDB {} failed: {}", op, e)),
    }
}
