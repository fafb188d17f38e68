//! Local transaction history.
//!
//! The log is newest-first and always persisted as a whole: every `append` or `clear` rewrites
//! the full JSON array. A missing or corrupt file loads as an empty log.

use crate::paths::BlockbankPaths;
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
#[cfg(test)]
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
}

/// One completed swap. `timestamp` is Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: String,
    pub from_symbol: String,
    pub to_symbol: String,
    pub from_amount: String,
    pub to_amount: String,
    pub timestamp: i64,
    pub status: TxStatus,
}

/// Where the serialized log lives.
///
/// Mutations are read-modify-write under the storage's own exclusion, so a writer always starts
/// from what is persisted now rather than from what it loaded earlier.
pub trait HistoryStorage: Send + Sync {
    fn read(&self) -> eyre::Result<Option<String>>;

    /// Hand the current contents to `f` and persist what it returns. `None` leaves storage untouched.
    fn update<F>(&self, f: F) -> eyre::Result<()>
    where
        F: FnOnce(Option<String>) -> eyre::Result<Option<String>>;

    /// Remove the log, returning what it held.
    fn take(&self) -> eyre::Result<Option<String>>;
}

/// `transactions.json` in the data dir, guarded by an advisory lock on a sidecar file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStorage {
    pub fn new(paths: &BlockbankPaths) -> Self {
        Self {
            path: paths.history_path(),
            lock_path: paths.history_lock_path(),
        }
    }
}

impl HistoryStorage for FileStorage {
    fn read(&self) -> eyre::Result<Option<String>> {
        crate::fsutil::read_optional_string(&self.path)
    }

    fn update<F>(&self, f: F) -> eyre::Result<()>
    where
        F: FnOnce(Option<String>) -> eyre::Result<Option<String>>,
    {
        let _lock = crate::fsutil::lock_exclusive(&self.lock_path)?;
        let current = crate::fsutil::read_optional_string(&self.path)?;
        if let Some(next) = f(current)? {
            crate::fsutil::write_string_atomic_private(&self.path, &next)?;
        }
        Ok(())
    }

    fn take(&self) -> eyre::Result<Option<String>> {
        let _lock = crate::fsutil::lock_exclusive(&self.lock_path)?;
        let current = crate::fsutil::read_optional_string(&self.path)?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(current),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(eyre::Report::new(e).wrap_err(format!("remove {}", self.path.display()))),
        }
    }
}

/// In-process storage. Clones share the same slot.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<String>>>,
    fail_writes: Arc<AtomicBool>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn with_contents(s: &str) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(s.to_owned()))),
            ..Self::default()
        }
    }

    /// Make every later write fail, as a full disk would.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn slot(&self) -> eyre::Result<std::sync::MutexGuard<'_, Option<String>>> {
        self.slot
            .lock()
            .map_err(|e| eyre::eyre!("history storage poisoned: {e}"))
    }
}

#[cfg(test)]
impl HistoryStorage for MemoryStorage {
    fn read(&self) -> eyre::Result<Option<String>> {
        Ok(self.slot()?.clone())
    }

    fn update<F>(&self, f: F) -> eyre::Result<()>
    where
        F: FnOnce(Option<String>) -> eyre::Result<Option<String>>,
    {
        let mut slot = self.slot()?;
        if let Some(next) = f(slot.clone())? {
            if self.fail_writes.load(Ordering::SeqCst) {
                eyre::bail!("no space left on device");
            }
            *slot = Some(next);
        }
        Ok(())
    }

    fn take(&self) -> eyre::Result<Option<String>> {
        Ok(self.slot()?.take())
    }
}

/// Parse persisted contents. Absent or unparseable contents are an empty log; the failure is
/// logged, never returned.
fn parse_log(contents: Option<&str>) -> Vec<TransactionRecord> {
    let Some(s) = contents.filter(|s| !s.trim().is_empty()) else {
        return vec![];
    };
    match serde_json::from_str::<Vec<TransactionRecord>>(s) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse transaction history; starting empty");
            vec![]
        }
    }
}

/// The persisted log plus this process's view of it.
#[derive(Debug)]
pub struct HistoryStore<S> {
    storage: S,
    records: Vec<TransactionRecord>,
}

impl<S: HistoryStorage> HistoryStore<S> {
    /// Read the persisted log. Absent, unreadable, or unparseable storage yields an empty log.
    pub fn load(storage: S) -> Self {
        let records = match storage.read() {
            Ok(contents) => parse_log(contents.as_deref()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read transaction history; starting empty");
                vec![]
            }
        };
        Self { storage, records }
    }

    /// Newest first, as of the last load or mutation.
    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    /// Prepend `record` to the persisted log and rewrite it whole. Returns `false` if the hash was
    /// already present.
    ///
    /// The log is re-read under the storage lock, so records written by other processes since
    /// [`HistoryStore::load`] are kept.
    pub fn append(&mut self, record: TransactionRecord) -> eyre::Result<bool> {
        let mut fresh = vec![];
        let mut added = false;
        self.storage
            .update(|current| {
                fresh = parse_log(current.as_deref());
                if fresh.iter().any(|r| r.hash == record.hash) {
                    tracing::debug!(hash = %record.hash, "history already has this hash");
                    return Ok(None);
                }
                fresh.insert(0, record);
                added = true;
                serde_json::to_string(&fresh)
                    .map(Some)
                    .context("serialize transaction history")
            })
            .context("persist transaction history")?;
        self.records = fresh;
        Ok(added)
    }

    /// Empty the log in memory and in storage. Returns how many records were removed.
    pub fn clear(&mut self) -> eyre::Result<usize> {
        let previous = self.storage.take().context("clear transaction history")?;
        self.records.clear();
        Ok(parse_log(previous.as_deref()).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str, ts: i64) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_owned(),
            from_symbol: "BBUSD".to_owned(),
            to_symbol: "BBETH".to_owned(),
            from_amount: "100".to_owned(),
            to_amount: "0.05".to_owned(),
            timestamp: ts,
            status: TxStatus::Success,
        }
    }

    #[test]
    fn invalid_json_loads_as_empty() {
        let store = HistoryStore::load(MemoryStorage::with_contents("{not json"));
        assert!(store.records().is_empty());
    }

    #[test]
    fn append_prepends_and_persists_whole_log() -> eyre::Result<()> {
        let storage = MemoryStorage::default();
        let mut store = HistoryStore::load(storage.clone());
        assert!(store.append(record("0x01", 1))?);
        assert!(store.append(record("0x02", 2))?);
        assert_eq!(store.records().first().map(|r| r.hash.as_str()), Some("0x02"));

        let reloaded = HistoryStore::load(storage);
        assert_eq!(reloaded.records(), store.records());
        Ok(())
    }

    #[test]
    fn duplicate_hash_is_ignored() -> eyre::Result<()> {
        let mut store = HistoryStore::load(MemoryStorage::default());
        assert!(store.append(record("0xaa", 1))?);
        assert!(!store.append(record("0xaa", 2))?);
        assert_eq!(store.records().len(), 1);
        Ok(())
    }

    #[test]
    fn clear_empties_memory_and_storage() -> eyre::Result<()> {
        let storage = MemoryStorage::default();
        let mut store = HistoryStore::load(storage.clone());
        store.append(record("0x01", 1))?;
        assert_eq!(store.clear()?, 1);
        assert!(store.records().is_empty());
        assert_eq!(storage.read()?, None);
        Ok(())
    }

    #[test]
    fn wire_shape_matches_stored_format() -> eyre::Result<()> {
        let v = serde_json::to_value(record("0xab", 1_700_000_000_000))?;
        assert_eq!(v["fromSymbol"], "BBUSD");
        assert_eq!(v["toAmount"], "0.05");
        assert_eq!(v["timestamp"], 1_700_000_000_000_i64);
        assert_eq!(v["status"], "success");
        Ok(())
    }

    #[test]
    fn file_storage_round_trips_through_disk() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let paths = BlockbankPaths::at(td.path().join("c"), td.path().join("d"));
        let mut store = HistoryStore::load(FileStorage::new(&paths));
        store.append(record("0x01", 1))?;
        assert!(paths.history_path().exists());

        std::fs::write(paths.history_path(), "garbage")?;
        assert!(HistoryStore::load(FileStorage::new(&paths)).records().is_empty());

        let mut reopened = HistoryStore::load(FileStorage::new(&paths));
        reopened.clear()?;
        assert!(!paths.history_path().exists());
        Ok(())
    }

    fn file_paths(td: &tempfile::TempDir) -> BlockbankPaths {
        BlockbankPaths::at(td.path().join("c"), td.path().join("d"))
    }

    fn hashes<S: HistoryStorage>(store: &HistoryStore<S>) -> Vec<&str> {
        store.records().iter().map(|r| r.hash.as_str()).collect()
    }

    #[test]
    fn overlapping_writers_keep_each_others_records() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let paths = file_paths(&td);
        paths.ensure_private_dirs()?;
        let mut first = HistoryStore::load(FileStorage::new(&paths));
        let mut second = HistoryStore::load(FileStorage::new(&paths));

        first.append(record("0xa", 1))?;
        second.append(record("0xb", 2))?;

        assert_eq!(hashes(&second), ["0xb", "0xa"]);
        let reloaded = HistoryStore::load(FileStorage::new(&paths));
        assert_eq!(hashes(&reloaded), ["0xb", "0xa"]);
        Ok(())
    }

    #[test]
    fn clear_from_another_writer_is_not_undone_by_a_later_append() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let paths = file_paths(&td);
        paths.ensure_private_dirs()?;
        HistoryStore::load(FileStorage::new(&paths)).append(record("0xold", 1))?;

        let mut swapping = HistoryStore::load(FileStorage::new(&paths));
        assert_eq!(HistoryStore::load(FileStorage::new(&paths)).clear()?, 1);
        swapping.append(record("0xnew", 2))?;

        let reloaded = HistoryStore::load(FileStorage::new(&paths));
        assert_eq!(hashes(&reloaded), ["0xnew"]);
        Ok(())
    }

    #[test]
    fn duplicate_written_elsewhere_is_detected_under_the_lock() -> eyre::Result<()> {
        let storage = MemoryStorage::default();
        let mut stale = HistoryStore::load(storage.clone());
        HistoryStore::load(storage.clone()).append(record("0xaa", 1))?;

        assert!(!stale.append(record("0xaa", 1))?);
        assert_eq!(hashes(&stale), ["0xaa"]);
        Ok(())
    }

    #[test]
    fn failed_write_leaves_log_unchanged() -> eyre::Result<()> {
        let storage = MemoryStorage::default();
        let mut store = HistoryStore::load(storage.clone());
        store.append(record("0x01", 1))?;
        storage.fail_writes();
        assert!(store.append(record("0x02", 2)).is_err());
        assert_eq!(hashes(&HistoryStore::load(storage)), ["0x01"]);
        Ok(())
    }
}
