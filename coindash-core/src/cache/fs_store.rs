//! Filesystem-backed persistent store.
//!
//! Layout: `{base_dir}/{database}/{store}/{hash}.rec` + optional `{hash}.touch`
//!
//! - `hash` is the BLAKE3 hex digest of the record key
//! - a `.rec` file is one row: a big-endian `u32` header length, the JSON
//!   header `{key, savedAt, accessedAt}`, then the encoded payload; header
//!   and payload are replaced together by a single rename
//! - `touch` writes only the `.touch` file (an `accessedAt` stamp), so it
//!   never rewrites a row a concurrent `put` may be replacing; the effective
//!   `accessedAt` is the later of the two
//! - every write goes through its own uniquely named temp file in the store
//!   directory before being persisted over the target
//! - corrupt rows are quarantined (`{file}.quarantined`) and skipped

use super::entry::{RecordMeta, StoredRecord};
use super::store::{PersistentStore, StoreError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

const RECORD_EXT: &str = "rec";
const TOUCH_EXT: &str = "touch";
const LEN_PREFIX: usize = 4;
const MAX_HEADER_LEN: usize = 64 * 1024;

pub struct FsStore {
    name: String,
    dir: PathBuf,
}

impl FsStore {
    /// A store named `{database}/{store}` rooted under `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>, database: &str, store: &str) -> Self {
        Self {
            name: format!("{database}/{store}"),
            dir: base_dir.as_ref().join(database).join(store),
        }
    }

    /// Directory holding this store's rows.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(key: &str) -> String {
        blake3::hash(key.as_bytes()).to_hex().to_string()
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXT}", Self::stem(key)))
    }

    fn touch_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{TOUCH_EXT}", Self::stem(key)))
    }

    async fn quarantine(&self, path: &Path, error: &StoreError) {
        let mut target: OsString = path.as_os_str().to_owned();
        target.push(".quarantined");
        warn!(
            store = %self.name,
            path = %path.display(),
            error = %error,
            "quarantining corrupt cache row"
        );
        if let Err(e) = fs::rename(path, PathBuf::from(target)).await {
            debug!(store = %self.name, path = %path.display(), error = %e, "quarantine rename failed");
        }
    }
}

#[async_trait]
impl PersistentStore for FsStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let bytes = match fs::read(self.record_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (meta, body) = decode_record(&bytes)?;
        if meta.key != key {
            return Ok(None);
        }
        let touched = read_touch(&self.touch_path(key)).await;
        Ok(Some(StoredRecord {
            key: meta.key,
            saved_at: meta.saved_at,
            accessed_at: touched.map_or(meta.accessed_at, |t| t.max(meta.accessed_at)),
            data: body.to_vec(),
        }))
    }

    async fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let bytes = encode_record(&record)?;
        write_atomic(&self.dir, &self.record_path(&record.key), bytes).await
    }

    async fn touch(&self, key: &str, accessed_at: i64) -> Result<(), StoreError> {
        match read_header(&self.record_path(key)).await? {
            Some(meta) if meta.key == key => {}
            _ => return Ok(()),
        }
        let stamp = accessed_at.to_string().into_bytes();
        write_atomic(&self.dir, &self.touch_path(key), stamp).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let removed = remove_if_exists(&self.record_path(key)).await?;
        remove_if_exists(&self.touch_path(key)).await?;
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<RecordMeta>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }

            match read_header(&path).await {
                Ok(Some(mut meta)) => {
                    if let Some(t) = read_touch(&path.with_extension(TOUCH_EXT)).await {
                        meta.accessed_at = meta.accessed_at.max(t);
                    }
                    rows.push(meta);
                }
                // removed between read_dir and open
                Ok(None) => {}
                Err(e @ StoreError::Serde(_)) => self.quarantine(&path, &e).await,
                Err(e) => return Err(e),
            }
        }
        Ok(rows)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let rows = self.list().await?;
        let mut removed = 0;
        for row in &rows {
            if self.remove(&row.key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn encode_record(record: &StoredRecord) -> Result<Vec<u8>, StoreError> {
    let header = serde_json::to_vec(&record.meta())?;
    if header.len() > MAX_HEADER_LEN {
        return Err(StoreError::Serde(format!(
            "record header too large: {} bytes",
            header.len()
        )));
    }
    let mut out = Vec::with_capacity(LEN_PREFIX + header.len() + record.data.len());
    out.extend_from_slice(&(header.len() as u32).to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&record.data);
    Ok(out)
}

fn header_len(prefix: [u8; LEN_PREFIX]) -> Result<usize, StoreError> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_HEADER_LEN {
        return Err(StoreError::Serde(format!("record header length {len} out of range")));
    }
    Ok(len)
}

fn decode_record(bytes: &[u8]) -> Result<(RecordMeta, &[u8]), StoreError> {
    let truncated = || StoreError::Serde("truncated cache record".into());
    let prefix: [u8; LEN_PREFIX] = bytes
        .get(..LEN_PREFIX)
        .and_then(|p| p.try_into().ok())
        .ok_or_else(truncated)?;
    let len = header_len(prefix)?;
    let header = bytes.get(LEN_PREFIX..LEN_PREFIX + len).ok_or_else(truncated)?;
    let meta: RecordMeta = serde_json::from_slice(header)?;
    Ok((meta, &bytes[LEN_PREFIX + len..]))
}

/// Reads only the header of a row; payloads are never loaded for listing.
async fn read_header(path: &Path) -> Result<Option<RecordMeta>, StoreError> {
    let mut file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut prefix = [0u8; LEN_PREFIX];
    read_exact(&mut file, &mut prefix).await?;
    let mut header = vec![0u8; header_len(prefix)?];
    read_exact(&mut file, &mut header).await?;
    Ok(Some(serde_json::from_slice(&header)?))
}

async fn read_exact(file: &mut fs::File, buf: &mut [u8]) -> Result<(), StoreError> {
    match file.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(StoreError::Serde("truncated cache record".into()))
        }
        Err(e) => Err(e.into()),
    }
}

/// An unreadable or malformed stamp is ignored; the header value stands.
async fn read_touch(path: &Path) -> Option<i64> {
    let raw = fs::read_to_string(path).await.ok()?;
    raw.trim().parse().ok()
}

/// Write `bytes` to a fresh temp file in `dir`, then rename it over `path`.
async fn write_atomic(dir: &Path, path: &Path, bytes: Vec<u8>) -> Result<(), StoreError> {
    let dir = dir.to_path_buf();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path)
            .map_err(|e| StoreError::Io(format!("atomic rename failed: {}", e.error)))?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Io(format!("write task failed: {e}")))?
}

async fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(key: &str, accessed_at: i64, data: &[u8]) -> StoredRecord {
        StoredRecord {
            key: key.to_string(),
            saved_at: accessed_at,
            accessed_at,
            data: data.to_vec(),
        }
    }

    fn stamped(key: &str, saved_at: i64) -> StoredRecord {
        record(key, saved_at, saved_at.to_string().as_bytes())
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path(), "chart_bundle_cache", "bundle");

        store.put(record("spot|BTCUSDT|1h", 10, b"payload")).await.unwrap();
        let row = store.get("spot|BTCUSDT|1h").await.unwrap().unwrap();

        assert_eq!(row.data, b"payload");
        assert_eq!(row.saved_at, 10);
        assert_eq!(store.name(), "chart_bundle_cache/bundle");
        assert!(store.dir().ends_with("chart_bundle_cache/bundle"));
    }

    #[tokio::test]
    async fn missing_key_and_missing_dir_are_misses() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path(), "db", "rows");
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
        assert!(!store.remove("nope").await.unwrap());
        store.touch("nope", 5).await.unwrap();
        assert!(!store.touch_path("nope").exists());
    }

    #[tokio::test]
    async fn touch_updates_only_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path(), "db", "rows");
        store.put(record("k", 1, b"x")).await.unwrap();
        let before = std::fs::read(store.record_path("k")).unwrap();
        store.touch("k", 99).await.unwrap();

        let row = store.get("k").await.unwrap().unwrap();
        assert_eq!(row.accessed_at, 99);
        assert_eq!(row.saved_at, 1);
        assert_eq!(row.data, b"x");
        assert_eq!(std::fs::read(store.record_path("k")).unwrap(), before);
        assert_eq!(store.list().await.unwrap()[0].accessed_at, 99);
    }

    #[tokio::test]
    async fn prune_removes_oldest_accessed_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path(), "db", "rows");
        for i in 0..6 {
            store.put(record(&format!("k{i}"), i, b"x")).await.unwrap();
        }
        store.touch("k0", 100).await.unwrap();

        assert_eq!(store.prune(4).await.unwrap(), 2);
        let mut keys: Vec<String> = store.list().await.unwrap().into_iter().map(|m| m.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["k0", "k3", "k4", "k5"]);
        assert!(store.get("k1").await.unwrap().is_none());
        assert!(!store.touch_path("k1").exists());
    }

    #[tokio::test]
    async fn corrupt_row_is_quarantined() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path(), "db", "rows");
        store.put(record("good", 1, b"x")).await.unwrap();
        std::fs::write(store.dir().join("deadbeef.rec"), b"\x00\x00\x00\x09{not json").unwrap();
        std::fs::write(store.dir().join("cafef00d.rec"), b"\xff\xff").unwrap();

        let rows = store.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(store.dir().join("deadbeef.rec.quarantined").exists());
        assert!(store.dir().join("cafef00d.rec.quarantined").exists());
    }

    #[tokio::test]
    async fn oversized_header_length_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path(), "db", "rows");
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.record_path("k"), b"\xff\xff\xff\xffpayload").unwrap();

        assert!(matches!(store.get("k").await, Err(StoreError::Serde(_))));
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path(), "db", "rows");
        store.put(record("a", 1, b"x")).await.unwrap();
        store.put(record("b", 2, b"y")).await.unwrap();
        store.touch("b", 3).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_key_puts_leave_a_consistent_row() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FsStore::new(tmp.path(), "chart_bundle_cache", "bundle"));
        let key = "spot|BTCUSDT|1h";

        for round in 0..25i64 {
            let writers: Vec<_> = (0..4i64)
                .map(|i| {
                    let store = Arc::clone(&store);
                    tokio::spawn(async move { store.put(stamped(key, round * 4 + i)).await })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap().unwrap();
            }

            let row = store.get(key).await.unwrap().unwrap();
            assert_eq!(row.data, row.saved_at.to_string().into_bytes(), "round {round}");
            assert_eq!(row.saved_at / 4, round);
        }

        let names: Vec<String> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.rec", FsStore::stem(key))]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn touch_racing_put_never_mixes_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FsStore::new(tmp.path(), "db", "rows"));
        store.put(stamped("k", 0)).await.unwrap();

        let mut tasks = Vec::new();
        for i in 1..=40i64 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.put(stamped("k", i)).await
                } else {
                    store.touch("k", 1_000 + i).await
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let row = store.get("k").await.unwrap().unwrap();
        assert_eq!(row.data, row.saved_at.to_string().into_bytes());
        assert!(row.accessed_at > 1_000);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
