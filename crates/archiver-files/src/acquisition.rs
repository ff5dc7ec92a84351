//! Acquisition coordinator: a single dedicated task owns
//! the map of in-flight downloads and their refcounts outright — no
//! `Mutex` — a single owner for shared mutable state. Callers talk to
//! it over an mpsc channel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::download::{self, DownloadOutcome};
use crate::error::{DownloadError, FileStoreError, FileStoreResult};
use crate::record::FileRecordStore;
use crate::store::FileStore;

/// What an `acquire_if_needed` call settles to.
#[derive(Debug, Clone)]
pub struct AcquireResult {
    pub hash: Option<Vec<u8>>,
    pub error_code: Option<String>,
    pub created_file: bool,
}

/// A handle returned by `acquire_if_needed`. Each caller must eventually
/// call `abort()` exactly once (consuming the handle makes a second call
/// impossible to express — aborting an already-settled acquisition is an
/// error, enforced by the type rather than at runtime).
pub struct Acquisition {
    url: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    result: FileStoreResult<AcquireResult>,
}

impl Acquisition {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn result(&self) -> &FileStoreResult<AcquireResult> {
        &self.result
    }

    pub async fn abort(self) -> FileStoreResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Release { url: self.url.clone(), reply: reply_tx })
            .map_err(|_| FileStoreError::AlreadySettled { url: self.url.clone(), location: loc() })?;
        reply_rx.await.map_err(|_| FileStoreError::AlreadySettled { url: self.url, location: loc() })?
    }

    /// Promote a successfully downloaded pending file into its final
    /// location. Idempotent — safe to call more than
    /// once, e.g. from several acquisitions that deduplicated onto the
    /// same URL. Does not release this handle's refcount share; the
    /// caller still owes a separate `abort()` once it no longer needs the
    /// acquisition.
    pub async fn settle(&self) -> FileStoreResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Settle { url: self.url.clone(), reply: reply_tx })
            .map_err(|_| FileStoreError::AlreadySettled { url: self.url.clone(), location: loc() })?;
        reply_rx.await.map_err(|_| FileStoreError::AlreadySettled { url: self.url.clone(), location: loc() })?
    }
}

fn loc() -> snafu::Location {
    snafu::Location::new(file!(), line!(), column!())
}

enum Command {
    AcquireIfNeeded {
        url: String,
        reply: oneshot::Sender<FileStoreResult<Acquisition>>,
    },
    Release {
        url: String,
        reply: oneshot::Sender<FileStoreResult<()>>,
    },
    Settle {
        url: String,
        reply: oneshot::Sender<FileStoreResult<()>>,
    },
    Close {
        reply: oneshot::Sender<FileStoreResult<()>>,
    },
    DownloadFinished {
        url: String,
        outcome: Result<DownloadOutcome, DownloadError>,
    },
}

struct InFlight {
    refcount: usize,
    aborted: bool,
    file_settled: bool,
    cancel: CancellationToken,
    pending_path: PathBuf,
    settled_result: Option<FileStoreResult<AcquireResult>>,
    waiters: Vec<oneshot::Sender<FileStoreResult<Acquisition>>>,
}

/// A clonable front for the coordinator's dedicated task.
#[derive(Clone)]
pub struct AcquisitionCoordinator {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl AcquisitionCoordinator {
    /// Spawn the coordinator's owning task. `max_concurrent_downloads`
    /// bounds the download engine's fan-out.
    pub fn spawn(store: Arc<FileStore>, records: Arc<dyn FileRecordStore>, http: reqwest::Client, max_concurrent_downloads: usize) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let limiter = Arc::new(Semaphore::new(max_concurrent_downloads.max(1)));
        tokio::spawn(run(cmd_rx, cmd_tx.clone(), store, records, http, limiter));
        Self { cmd_tx }
    }

    /// Ask the database (via `FileRecordStore`) whether `url` is already
    /// resolved; if not, download it, deduplicating concurrent callers
    /// requesting the same URL.
    pub async fn acquire_if_needed(&self, url: impl Into<String>) -> FileStoreResult<Acquisition> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::AcquireIfNeeded { url: url.into(), reply: reply_tx })
            .map_err(|_| FileStoreError::OutstandingAcquisitions { location: loc() })?;
        reply_rx.await.map_err(|_| FileStoreError::OutstandingAcquisitions { location: loc() })?
    }

    /// Refuse if any acquisition still holds a non-aborting refcount
    ///; otherwise stop the coordinator's task.
    pub async fn close(&self) -> FileStoreResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close { reply: reply_tx }).is_err() {
            return Ok(()); // already stopped
        }
        reply_rx.await.unwrap_or(Ok(()))
    }
}

async fn run(
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    self_tx: mpsc::UnboundedSender<Command>,
    store: Arc<FileStore>,
    records: Arc<dyn FileRecordStore>,
    http: reqwest::Client,
    limiter: Arc<Semaphore>,
) {
    // Owned exclusively by this task for its whole lifetime: no `Mutex`.
    let mut in_flight: HashMap<String, InFlight> = HashMap::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::AcquireIfNeeded { url, reply } => {
                handle_acquire(&mut in_flight, &self_tx, &store, &records, &http, &limiter, url, reply);
            }
            Command::Release { url, reply } => {
                handle_release(&mut in_flight, &store, url, reply);
            }
            Command::Settle { url, reply } => {
                handle_settle(&mut in_flight, &store, url, reply);
            }
            Command::Close { reply } => {
                let outstanding = in_flight.values().any(|e| e.refcount > 0 && !e.aborted);
                if outstanding {
                    let _ = reply.send(Err(FileStoreError::OutstandingAcquisitions { location: loc() }));
                } else {
                    let _ = reply.send(Ok(()));
                    return;
                }
            }
            Command::DownloadFinished { url, outcome } => {
                handle_download_finished(&mut in_flight, &self_tx, &store, &records, url, outcome);
            }
        }
    }
}

fn handle_acquire(
    in_flight: &mut HashMap<String, InFlight>,
    self_tx: &mpsc::UnboundedSender<Command>,
    store: &Arc<FileStore>,
    records: &Arc<dyn FileRecordStore>,
    http: &reqwest::Client,
    limiter: &Arc<Semaphore>,
    url: String,
    reply: oneshot::Sender<FileStoreResult<Acquisition>>,
) {
    if let Some(entry) = in_flight.get_mut(&url) {
        entry.refcount += 1;
        match &entry.settled_result {
            Some(result) => {
                let _ = reply.send(Ok(Acquisition { url, cmd_tx: self_tx.clone(), result: result.clone() }));
            }
            None => entry.waiters.push(reply),
        }
        return;
    }

    match records.file_hash(&url) {
        Ok(Some(existing)) => {
            let result = AcquireResult { hash: existing, error_code: None, created_file: false };
            let _ = reply.send(Ok(Acquisition { url, cmd_tx: self_tx.clone(), result: Ok(result) }));
            return;
        }
        Err(source) => {
            let _ = reply.send(Err(FileStoreError::Record { source, location: loc() }));
            return;
        }
        Ok(None) => {}
    }

    let pending_path = store.reserve_pending_name();
    let cancel = CancellationToken::new();
    in_flight.insert(
        url.clone(),
        InFlight {
            refcount: 1,
            aborted: false,
            file_settled: false,
            cancel: cancel.clone(),
            pending_path: pending_path.clone(),
            settled_result: None,
            waiters: vec![reply],
        },
    );

    let http = http.clone();
    let self_tx = self_tx.clone();
    let limiter = limiter.clone();
    tokio::spawn(async move {
        let _permit = limiter.acquire_owned().await.expect("download concurrency limiter is never closed");
        let outcome = download::download(&http, &url, &pending_path, &cancel).await;
        let _ = self_tx.send(Command::DownloadFinished { url, outcome });
    });
}

fn handle_download_finished(
    in_flight: &mut HashMap<String, InFlight>,
    self_tx: &mpsc::UnboundedSender<Command>,
    store: &Arc<FileStore>,
    records: &Arc<dyn FileRecordStore>,
    url: String,
    outcome: Result<DownloadOutcome, DownloadError>,
) {
    let Some(entry) = in_flight.get_mut(&url) else { return };

    // A failed download is a normal `{error_code}` outcome for the
    // caller to see — not a hard error — except when the failure is
    // this acquisition itself being aborted.
    let result: FileStoreResult<AcquireResult> = match outcome {
        Ok(download_outcome) => {
            let hash = download_outcome.hash;
            if store.blob_exists(hash.as_bytes()) {
                let _ = store.delete_pending(&entry.pending_path);
                Ok(AcquireResult { hash: Some(hash.as_bytes().to_vec()), error_code: None, created_file: false })
            } else {
                Ok(AcquireResult { hash: Some(hash.as_bytes().to_vec()), error_code: None, created_file: true })
            }
        }
        Err(DownloadError::Aborted { .. }) => {
            let _ = store.delete_pending(&entry.pending_path);
            Err(FileStoreError::Download { url: url.clone(), source: DownloadError::Aborted { location: loc() }, location: loc() })
        }
        Err(download_error) => {
            let _ = store.delete_pending(&entry.pending_path);
            let code = match &download_error {
                DownloadError::PermanentStatus { status, .. } => status.to_string(),
                _ => "download_failed".to_string(),
            };
            if let Err(source) = records.record_file(&url, None, Some(&code)) {
                tracing::warn!(target: crate::store::LOG_TARGET, url, error = %source, "failed to record download failure");
            }
            Ok(AcquireResult { hash: None, error_code: Some(code), created_file: false })
        }
    };

    if entry.aborted {
        // Every caller already released; just finish cleaning up.
        in_flight.remove(&url);
        return;
    }

    entry.settled_result = Some(result.clone());
    for waiter in entry.waiters.drain(..) {
        let handle = result.clone().map(|r| Acquisition { url: url.clone(), cmd_tx: self_tx.clone(), result: Ok(r) });
        let _ = waiter.send(handle);
    }
}

fn handle_release(in_flight: &mut HashMap<String, InFlight>, store: &Arc<FileStore>, url: String, reply: oneshot::Sender<FileStoreResult<()>>) {
    // No entry means either a no-op acquisition (the URL already had a
    // database row, so nothing was ever downloaded) or an acquisition
    // whose refcount already reached zero — both are harmless no-ops.
    let Some(entry) = in_flight.get_mut(&url) else {
        let _ = reply.send(Ok(()));
        return;
    };

    entry.refcount = entry.refcount.saturating_sub(1);
    if entry.refcount > 0 {
        let _ = reply.send(Ok(()));
        return;
    }

    match &entry.settled_result {
        Some(Ok(result)) if result.created_file && !entry.file_settled => {
            let _ = store.delete_pending(&entry.pending_path);
            in_flight.remove(&url);
        }
        Some(_) => {
            in_flight.remove(&url);
        }
        None => {
            entry.cancel.cancel();
            entry.aborted = true;
        }
    }
    let _ = reply.send(Ok(()));
}

fn handle_settle(in_flight: &mut HashMap<String, InFlight>, store: &Arc<FileStore>, url: String, reply: oneshot::Sender<FileStoreResult<()>>) {
    let Some(entry) = in_flight.get_mut(&url) else {
        // Already released and cleaned up, or never needed settling.
        let _ = reply.send(Ok(()));
        return;
    };
    if entry.file_settled {
        let _ = reply.send(Ok(()));
        return;
    }
    let outcome = match &entry.settled_result {
        Some(Ok(result)) if result.created_file => {
            let hash = result.hash.clone().unwrap_or_default();
            store.promote_pending(&entry.pending_path, &hash)
        }
        _ => Ok(()),
    };
    entry.file_settled = true;
    let _ = reply.send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeRecords {
        existing: StdMutex<StdHashMap<String, Option<Vec<u8>>>>,
    }

    impl FileRecordStore for FakeRecords {
        fn file_hash(&self, url: &str) -> Result<Option<Option<Vec<u8>>>, archiver_util_error::BoxedError> {
            Ok(self.existing.lock().unwrap().get(url).cloned())
        }
        fn record_file(&self, url: &str, hash: Option<&[u8]>, _error_code: Option<&str>) -> Result<(), archiver_util_error::BoxedError> {
            self.existing.lock().unwrap().insert(url.to_string(), hash.map(|h| h.to_vec()));
            Ok(())
        }
        fn is_hash_referenced(&self, hash: &[u8]) -> Result<bool, archiver_util_error::BoxedError> {
            Ok(self.existing.lock().unwrap().values().any(|h| h.as_deref() == Some(hash)))
        }
    }

    #[tokio::test]
    async fn already_recorded_url_short_circuits_without_downloading() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(FakeRecords {
            existing: StdMutex::new(StdHashMap::from([("https://cdn/a.png".to_string(), Some(vec![1, 2, 3]))])),
        });
        let store = Arc::new(FileStore::open(dir.path().join("blobs"), records.as_ref()).unwrap());
        let coordinator = AcquisitionCoordinator::spawn(store, records, reqwest::Client::new(), 4);

        let acquisition = coordinator.acquire_if_needed("https://cdn/a.png").await.unwrap();
        let result = acquisition.result().as_ref().unwrap();
        assert_eq!(result.hash, Some(vec![1, 2, 3]));
        assert!(!result.created_file);
        acquisition.abort().await.unwrap();
    }

    /// Minimal single-purpose HTTP/1.1 server for exercising the real
    /// download path without a mocking crate — same "spin up a real local
    /// server" idiom the web UI's own integration tests use. Counts
    /// accepted connections so tests can assert a URL was downloaded at
    /// most once.
    async fn start_fixed_body_server(body: &'static [u8]) -> (String, Arc<std::sync::atomic::AtomicUsize>) {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let mut discard = [0u8; 1024];
                let _ = socket.read(&mut discard).await;
                let header = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/blob"), connections)
    }

    #[tokio::test]
    async fn concurrent_acquisitions_of_the_same_url_download_once() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(FakeRecords { existing: StdMutex::new(StdHashMap::new()) });
        let store = Arc::new(FileStore::open(dir.path().join("blobs"), records.as_ref()).unwrap());
        let coordinator = AcquisitionCoordinator::spawn(Arc::clone(&store), Arc::clone(&records), reqwest::Client::new(), 4);

        let (url, connections) = start_fixed_body_server(b"identical payload").await;

        let (a, b) = tokio::join!(coordinator.acquire_if_needed(url.clone()), coordinator.acquire_if_needed(url.clone()));
        let a = a.unwrap();
        let b = b.unwrap();

        let hash_a = a.result().as_ref().unwrap().hash.clone();
        let hash_b = b.result().as_ref().unwrap().hash.clone();
        assert!(hash_a.is_some());
        assert_eq!(hash_a, hash_b);
        assert_eq!(connections.load(std::sync::atomic::Ordering::SeqCst), 1);

        a.settle().await.unwrap();
        b.settle().await.unwrap();
        assert!(store.blob_exists(hash_a.as_ref().unwrap()));
        a.abort().await.unwrap();
        b.abort().await.unwrap();
    }

    #[tokio::test]
    async fn aborting_an_acquisition_without_settling_never_promotes_the_blob() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(FakeRecords { existing: StdMutex::new(StdHashMap::new()) });
        let store = Arc::new(FileStore::open(dir.path().join("blobs"), records.as_ref()).unwrap());
        let coordinator = AcquisitionCoordinator::spawn(Arc::clone(&store), Arc::clone(&records), reqwest::Client::new(), 4);

        let (url, _connections) = start_fixed_body_server(b"abandoned payload").await;
        let acquisition = coordinator.acquire_if_needed(url.clone()).await.unwrap();
        let result = acquisition.result().as_ref().unwrap();
        assert!(result.created_file);
        let hash = result.hash.clone().unwrap();

        // Abandon without ever calling settle() — the caller's own
        // database write never happened, so the file must never end up
        // referenced or promoted either.
        acquisition.abort().await.unwrap();

        assert!(!store.blob_exists(&hash));
        assert!(std::fs::read_dir(store.pending_dir()).unwrap().next().is_none());
        assert!(records.existing.lock().unwrap().get(&url).is_none());
    }
}
