//! On-disk blob layout: committed blobs live at
//! `root/<base64url(hash)>`; in-flight downloads live under
//! `root/pending/<random-hex>` until an acquisition settles them.

use std::collections::HashSet;
use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use data_encoding::BASE64URL_NOPAD;
use rand::Rng as _;
use snafu::ResultExt as _;

use crate::error::{FileStoreError, FileStoreResult, IoSnafu, RecordSnafu};
use crate::record::FileRecordStore;

pub(crate) const LOG_TARGET: &str = "archiver::files";

pub fn blob_name(hash: &[u8]) -> String {
    BASE64URL_NOPAD.encode(hash)
}

pub(crate) fn hash_file(path: &Path) -> FileStoreResult<blake3::Hash> {
    let mut file = fs::File::open(path).context(IoSnafu { path: path.to_path_buf() })?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).context(IoSnafu { path: path.to_path_buf() })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// The outcome of a consistency sweep comparing on-disk blobs against the
/// set of hashes the database references.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Referenced in the database but missing from disk.
    pub missing: Vec<String>,
    /// Present on disk but not referenced by any row.
    pub extra: Vec<String>,
}

pub struct FileStore {
    root: PathBuf,
    pending_dir: PathBuf,
    live_pending_names: Mutex<HashSet<String>>,
}

impl FileStore {
    /// Open the store rooted at `root`, creating it (and `pending/`) if
    /// necessary, then reconciling any pending downloads left behind by a
    /// crash between "download complete" and "commit": each
    /// file under `pending/` is re-hashed and either promoted to the root
    /// (if the database references its hash) or deleted as an orphan.
    pub fn open(root: impl Into<PathBuf>, records: &dyn FileRecordStore) -> FileStoreResult<Self> {
        let root = root.into();
        let pending_dir = root.join("pending");
        fs::create_dir_all(&root).context(IoSnafu { path: root.clone() })?;
        fs::create_dir_all(&pending_dir).context(IoSnafu { path: pending_dir.clone() })?;

        let store = Self {
            root,
            pending_dir,
            live_pending_names: Mutex::new(HashSet::new()),
        };
        store.reconcile_pending(records)?;
        Ok(store)
    }

    fn reconcile_pending(&self, records: &dyn FileRecordStore) -> FileStoreResult<()> {
        let entries = fs::read_dir(&self.pending_dir).context(IoSnafu { path: self.pending_dir.clone() })?;
        for entry in entries {
            let entry = entry.context(IoSnafu { path: self.pending_dir.clone() })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let hash = hash_file(&path)?;
            let referenced = records.is_hash_referenced(hash.as_bytes()).context(RecordSnafu)?;
            if referenced {
                let dest = self.root.join(blob_name(hash.as_bytes()));
                if !dest.exists() {
                    fs::rename(&path, &dest).context(IoSnafu { path: path.clone() })?;
                }
                tracing::info!(target: LOG_TARGET, path = %path.display(), "promoted pending file left over from a crash");
            } else {
                fs::remove_file(&path).context(IoSnafu { path: path.clone() })?;
                tracing::info!(target: LOG_TARGET, path = %path.display(), "deleted orphaned pending file left over from a crash");
            }
        }
        Ok(())
    }

    /// Reserve a fresh name under `pending/`, retrying on collision with
    /// both the filesystem and other in-flight acquisitions.
    pub fn reserve_pending_name(&self) -> PathBuf {
        let mut live = self.live_pending_names.lock().expect("not poisoned");
        loop {
            let candidate = format!("{:08x}", rand::rng().random::<u32>());
            let path = self.pending_dir.join(&candidate);
            if live.contains(&candidate) || path.exists() {
                continue;
            }
            live.insert(candidate);
            return path;
        }
    }

    pub fn release_pending_name(&self, path: &Path) {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            self.live_pending_names.lock().expect("not poisoned").remove(name);
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pending_dir(&self) -> &Path {
        &self.pending_dir
    }

    pub fn blob_path(&self, hash: &[u8]) -> PathBuf {
        self.root.join(blob_name(hash))
    }

    pub fn blob_exists(&self, hash: &[u8]) -> bool {
        self.blob_path(hash).exists()
    }

    /// Atomically move a settled pending download into place, retrying
    /// transient rename failures up to twice.
    pub fn promote_pending(&self, pending_path: &Path, hash: &[u8]) -> FileStoreResult<()> {
        let dest = self.blob_path(hash);
        if dest.exists() {
            fs::remove_file(pending_path).context(IoSnafu { path: pending_path.to_path_buf() })?;
            self.release_pending_name(pending_path);
            return Ok(());
        }
        let mut last_err = None;
        for _ in 0..3 {
            match fs::rename(pending_path, &dest) {
                Ok(()) => {
                    self.release_pending_name(pending_path);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(FileStoreError::RenameRetriesExhausted {
            path: pending_path.to_path_buf(),
            location: snafu::Location::new(file!(), line!(), column!()),
        })
        .inspect_err(|_| {
            if let Some(e) = last_err {
                tracing::warn!(target: LOG_TARGET, error = %e, "pending file rename kept failing");
            }
        })
    }

    pub fn delete_pending(&self, pending_path: &Path) -> FileStoreResult<()> {
        if pending_path.exists() {
            fs::remove_file(pending_path).context(IoSnafu { path: pending_path.to_path_buf() })?;
        }
        self.release_pending_name(pending_path);
        Ok(())
    }

    /// Refuse if `pending/` is non-empty after the caller has awaited all
    /// outstanding acquisitions — a non-empty directory at this point is
    /// surprising but not fatal.
    pub fn close(self) -> FileStoreResult<()> {
        match fs::read_dir(&self.pending_dir) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    tracing::warn!(target: LOG_TARGET, "pending directory was not empty at close");
                } else {
                    let _ = fs::remove_dir(&self.pending_dir);
                }
            }
            Err(e) => tracing::warn!(target: LOG_TARGET, error = %e, "could not inspect pending directory at close"),
        }
        Ok(())
    }

    /// Compare on-disk blobs against every hash the database references
    ///. `delete_extra` sweeps unreferenced blobs.
    pub fn consistency_check(&self, referenced: &[Vec<u8>], delete_extra: bool) -> FileStoreResult<ConsistencyReport> {
        let referenced_names: HashSet<String> = referenced.iter().map(|h| blob_name(h)).collect();

        let mut on_disk = HashSet::new();
        for entry in fs::read_dir(&self.root).context(IoSnafu { path: self.root.clone() })? {
            let entry = entry.context(IoSnafu { path: self.root.clone() })?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                on_disk.insert(name.to_string());
            }
        }

        let mut report = ConsistencyReport::default();
        for name in &referenced_names {
            if !on_disk.contains(name) {
                report.missing.push(name.clone());
            }
        }
        for name in &on_disk {
            if !referenced_names.contains(name) {
                report.extra.push(name.clone());
                if delete_extra {
                    let _ = fs::remove_file(self.root.join(name));
                }
            }
        }
        report.missing.sort();
        report.extra.sort();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FakeRecords {
        referenced_hashes: StdMutex<HashSet<Vec<u8>>>,
    }

    impl FileRecordStore for FakeRecords {
        fn file_hash(&self, _url: &str) -> Result<Option<Option<Vec<u8>>>, archiver_util_error::BoxedError> {
            Ok(None)
        }
        fn record_file(&self, _url: &str, _hash: Option<&[u8]>, _error_code: Option<&str>) -> Result<(), archiver_util_error::BoxedError> {
            Ok(())
        }
        fn is_hash_referenced(&self, hash: &[u8]) -> Result<bool, archiver_util_error::BoxedError> {
            Ok(self.referenced_hashes.lock().unwrap().contains(hash))
        }
    }

    #[test]
    fn open_creates_root_and_pending_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        let records = FakeRecords { referenced_hashes: StdMutex::new(HashSet::new()) };
        let store = FileStore::open(&root, &records).unwrap();
        assert!(store.root().is_dir());
        assert!(store.pending_dir().is_dir());
    }

    #[test]
    fn reopen_promotes_referenced_orphan_and_deletes_unreferenced_one() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        fs::create_dir_all(root.join("pending")).unwrap();
        fs::write(root.join("pending").join("keep"), b"hello").unwrap();
        fs::write(root.join("pending").join("drop"), b"world").unwrap();
        let keep_hash = blake3::hash(b"hello");

        let records = FakeRecords { referenced_hashes: StdMutex::new(HashSet::from([keep_hash.as_bytes().to_vec()])) };
        let store = FileStore::open(&root, &records).unwrap();

        assert!(store.blob_exists(keep_hash.as_bytes()));
        assert!(!root.join("pending").join("drop").exists());
        assert!(!root.join("pending").join("keep").exists());
    }

    #[test]
    fn reserve_pending_name_never_collides_with_itself() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        let records = FakeRecords { referenced_hashes: StdMutex::new(HashSet::new()) };
        let store = FileStore::open(&root, &records).unwrap();
        let a = store.reserve_pending_name();
        let b = store.reserve_pending_name();
        assert_ne!(a, b);
    }

    #[test]
    fn consistency_check_reports_missing_and_extra() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        let records = FakeRecords { referenced_hashes: StdMutex::new(HashSet::new()) };
        let store = FileStore::open(&root, &records).unwrap();

        let present_hash = blake3::hash(b"present");
        let missing_hash = blake3::hash(b"missing");
        fs::write(store.blob_path(present_hash.as_bytes()), b"present").unwrap();
        fs::write(store.blob_path(b"unreferenced-blob-name"), b"extra").unwrap();

        let referenced = vec![present_hash.as_bytes().to_vec(), missing_hash.as_bytes().to_vec()];
        let report = store.consistency_check(&referenced, false).unwrap();

        assert_eq!(report.missing, vec![blob_name(missing_hash.as_bytes())]);
        assert!(report.extra.contains(&blob_name(b"unreferenced-blob-name")));
    }
}
