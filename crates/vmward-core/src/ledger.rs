//! File-backed VM ledger.
//!
//! The ledger is a pretty-printed JSON array of [`VmRecord`]s. Writers take
//! an exclusive lock on a sidecar `<ledger>.lock` file for the whole
//! read-modify-write, then replace the ledger via a temp file and rename so
//! readers never see a partial write. Readers do not lock.
//!
//! A missing or blank file is an empty ledger. A file that does not parse is
//! [`LedgerError::Corrupt`]; records are never dropped silently.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use vmward_types::{LedgerError, NetworkingInfo, VmRecord};

/// The mutable fields of a ledger record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordUpdate {
    /// Replace the tracked expiry.
    TtlExpiry(Option<DateTime<Utc>>),
    /// Replace host, port and IPv6 address.
    Networking(NetworkingInfo),
}

impl RecordUpdate {
    fn apply(&self, record: &mut VmRecord) {
        match self {
            Self::TtlExpiry(at) => record.ttl_expires_at = *at,
            Self::Networking(info) => record.apply_networking(info),
        }
    }
}

type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Durable store of the VMs this agent believes it owns.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, in ledger order.
    pub async fn load(&self) -> LedgerResult<Vec<VmRecord>> {
        self.blocking(read_records).await
    }

    /// Overwrite the ledger with `records`.
    pub async fn save(&self, records: Vec<VmRecord>) -> LedgerResult<()> {
        self.blocking(move |path| with_write_lock(path, || write_records(path, &records)))
            .await
    }

    /// Append a record. Identifiers are assigned remotely, so duplicates
    /// are not checked.
    pub async fn add(&self, record: VmRecord) -> LedgerResult<()> {
        self.blocking(move |path| {
            with_write_lock(path, || {
                let mut records = read_records(path)?;
                records.push(record);
                write_records(path, &records)
            })
        })
        .await
    }

    /// Remove the record with `item_hash`, returning it if it was present.
    pub async fn remove(&self, item_hash: &str) -> LedgerResult<Option<VmRecord>> {
        let item_hash = item_hash.to_owned();
        self.blocking(move |path| {
            with_write_lock(path, || {
                let records = read_records(path)?;
                let (removed, kept): (Vec<_>, Vec<_>) =
                    records.into_iter().partition(|r| r.item_hash == item_hash);
                if removed.is_empty() {
                    return Ok(None);
                }
                write_records(path, &kept)?;
                Ok(removed.into_iter().next())
            })
        })
        .await
    }

    /// Look up a record without side effects.
    pub async fn find(&self, item_hash: &str) -> LedgerResult<Option<VmRecord>> {
        let records = self.load().await?;
        Ok(records.into_iter().find(|r| r.item_hash == item_hash))
    }

    /// Apply `update` to the record with `item_hash` and persist it.
    ///
    /// Returns the updated record, or `None` without writing if absent.
    pub async fn update(
        &self,
        item_hash: &str,
        update: RecordUpdate,
    ) -> LedgerResult<Option<VmRecord>> {
        let item_hash = item_hash.to_owned();
        self.blocking(move |path| {
            with_write_lock(path, || {
                let mut records = read_records(path)?;
                let Some(record) = records.iter_mut().find(|r| r.item_hash == item_hash) else {
                    return Ok(None);
                };
                update.apply(record);
                let updated = record.clone();
                write_records(path, &records)?;
                Ok(Some(updated))
            })
        })
        .await
    }

    /// Records whose tracked expiry is at or before `now`.
    pub async fn check_expired(&self, now: DateTime<Utc>) -> LedgerResult<Vec<VmRecord>> {
        let records = self.load().await?;
        Ok(records.into_iter().filter(|r| r.is_expired(now)).collect())
    }

    async fn blocking<T, F>(&self, f: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> LedgerResult<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || f(&path))
            .await
            .map_err(|e| LedgerError::Task(e.to_string()))?
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> LedgerError + '_ {
    move |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn read_records(path: &Path) -> LedgerResult<Vec<VmRecord>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path)(e)),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn write_records(path: &Path, records: &[VmRecord]) -> LedgerResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let mut body = serde_json::to_string_pretty(records).map_err(LedgerError::Serialize)?;
    body.push('\n');

    let tmp = sibling(path, ".tmp");
    let mut file = File::create(&tmp).map_err(io_error(&tmp))?;
    file.write_all(body.as_bytes()).map_err(io_error(&tmp))?;
    file.sync_all().map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))?;

    debug!(path = %path.display(), records = records.len(), "ledger saved");
    Ok(())
}

/// Run `f` while holding the exclusive writer lock for `path`.
fn with_write_lock<T>(path: &Path, f: impl FnOnce() -> LedgerResult<T>) -> LedgerResult<T> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let lock_path = sibling(path, ".lock");
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(io_error(&lock_path))?;
    // Released when `lock` drops.
    lock.lock().map_err(io_error(&lock_path))?;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(hash: &str) -> VmRecord {
        VmRecord {
            item_hash: hash.into(),
            name: format!("vm-{hash}"),
            node_hash: "node-1".into(),
            node_url: "https://node1.example.com".into(),
            compute_units: 1,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            ttl_expires_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 4, 0, 0).unwrap()),
            hourly_cost: 1.425,
            signing_address: Some("0xabc".into()),
            purpose: None,
            ssh_user: "root".into(),
            ipv4_host: None,
            ssh_port: None,
            ipv6: None,
        }
    }

    fn ledger_in(dir: &tempfile::TempDir) -> Ledger {
        Ledger::new(dir.path().join("nested").join("inventory.json"))
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        assert!(ledger.load().await.unwrap().is_empty());
        assert!(ledger.find("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        std::fs::write(&path, "  \n\t").unwrap();
        assert!(Ledger::new(&path).load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Ledger::new(&path).load().await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));

        // A corrupt ledger must not be overwritten by a writer.
        let err = Ledger::new(&path).add(record("h1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let records = vec![record("c"), record("a"), record("b")];

        ledger.save(records.clone()).await.unwrap();
        let loaded = ledger.load().await.unwrap();
        assert_eq!(loaded, records);

        ledger.save(loaded.clone()).await.unwrap();
        assert_eq!(ledger.load().await.unwrap(), records);
    }

    #[tokio::test]
    async fn save_creates_parent_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.save(vec![record("h1")]).await.unwrap();

        assert!(ledger.path().exists());
        assert!(!sibling(ledger.path(), ".tmp").exists());
        let raw = std::fs::read_to_string(ledger.path()).unwrap();
        assert!(raw.trim_start().starts_with('['));
    }

    #[tokio::test]
    async fn add_appends() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.add(record("h1")).await.unwrap();
        ledger.add(record("h2")).await.unwrap();

        let hashes: Vec<_> = ledger
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.item_hash)
            .collect();
        assert_eq!(hashes, vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn remove_returns_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.save(vec![record("h1"), record("h2")]).await.unwrap();

        let removed = ledger.remove("h1").await.unwrap().unwrap();
        assert_eq!(removed.item_hash, "h1");
        assert!(ledger.remove("h1").await.unwrap().is_none());

        let left = ledger.load().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].item_hash, "h2");
    }

    #[tokio::test]
    async fn update_ttl_and_networking() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.save(vec![record("h1")]).await.unwrap();

        let later = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        let updated = ledger
            .update("h1", RecordUpdate::TtlExpiry(Some(later)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.ttl_expires_at, Some(later));

        let info = NetworkingInfo {
            ipv4_host: Some("1.2.3.4".into()),
            ssh_port: Some(24005),
            ipv6: None,
        };
        ledger
            .update("h1", RecordUpdate::Networking(info))
            .await
            .unwrap();

        let stored = ledger.find("h1").await.unwrap().unwrap();
        assert_eq!(stored.ttl_expires_at, Some(later));
        assert_eq!(stored.ipv4_host.as_deref(), Some("1.2.3.4"));
        assert_eq!(stored.ssh_port, Some(24005));
    }

    #[tokio::test]
    async fn update_missing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let result = ledger
            .update("ghost", RecordUpdate::TtlExpiry(None))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(!ledger.path().exists());
    }

    #[tokio::test]
    async fn check_expired_skips_untracked() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let mut untracked = record("h2");
        untracked.ttl_expires_at = None;
        ledger.save(vec![record("h1"), untracked]).await.unwrap();

        let expiry = record("h1").ttl_expires_at.unwrap();
        assert!(ledger
            .check_expired(expiry - Duration::minutes(1))
            .await
            .unwrap()
            .is_empty());

        let expired = ledger.check_expired(expiry).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].item_hash, "h1");
    }

    #[tokio::test]
    async fn concurrent_adds_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);

        let mut handles = Vec::new();
        for i in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.add(record(&format!("h{i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.load().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn legacy_ledger_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        std::fs::write(
            &path,
            r#"[{
                "item_hash": "old",
                "name": "legacy",
                "crn_hash": "c1",
                "crn_url": "https://crn",
                "compute_units": 2,
                "created_at": "2025-01-01T00:00:00+00:00",
                "ttl_expires_at": null,
                "estimated_hourly_cost": 2.85
            }]"#,
        )
        .unwrap();

        let records = Ledger::new(&path).load().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node_url, "https://crn");
        assert_eq!(records[0].hourly_cost, 2.85);
        assert_eq!(records[0].ssh_user, "root");
    }
}
