//! File-backed request store.
//!
//! Layout: `<base>/<identity>/<ordinal>.json`, one file per recorded request.
//! The ordinal comes from a store-wide sequence, so sorting one identity's
//! files by ordinal gives insertion order.

use super::types::{RecordedRequest, StoreError};
use crate::expectation::InterceptedRequest;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Durable per-expectation log of matched requests.
///
/// Every save and lookup runs under one store-wide lock that also guards the
/// sequence counter.
#[derive(Debug)]
pub struct RequestStore {
    base_dir: PathBuf,
    sequence: Mutex<u64>,
}

impl RequestStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            sequence: Mutex::new(0),
        }
    }

    /// Buffer the request body and persist the request under `identity`.
    pub async fn save(
        &self,
        identity: Uuid,
        req: &mut InterceptedRequest,
    ) -> Result<(), StoreError> {
        let body = req.body().await.map_err(StoreError::BodyRead)?;
        let record = RecordedRequest {
            url: req.url(),
            method: req.method().to_string(),
            headers: req.canonical_headers(),
            body_base64: BASE64.encode(&body),
        };
        self.save_record(identity, &record).await
    }

    /// Persist an already built record under `identity`.
    pub async fn save_record(
        &self,
        identity: Uuid,
        record: &RecordedRequest,
    ) -> Result<(), StoreError> {
        let dir = self.identity_dir(identity);
        let mut sequence = self.sequence.lock().await;

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let json = serde_json::to_vec(record).map_err(|source| StoreError::Json {
            path: dir.clone(),
            source,
        })?;

        // Ordinals already on disk from an earlier run are never overwritten.
        loop {
            let path = dir.join(format!("{}.json", *sequence));
            *sequence += 1;
            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StoreError::io(&path, e)),
            };
            file.write_all(&json)
                .await
                .map_err(|e| StoreError::io(&path, e))?;
            file.flush().await.map_err(|e| StoreError::io(&path, e))?;
            debug!(identity = %identity, path = ?path, "Recorded request");
            return Ok(());
        }
    }

    /// Every request recorded under `identity`, oldest first. An identity with
    /// no records yields an empty list.
    pub async fn find(&self, identity: Uuid) -> Result<Vec<RecordedRequest>, StoreError> {
        let dir = self.identity_dir(identity);
        let _guard = self.sequence.lock().await;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            let path = entry.path();
            if let Some(ordinal) = record_ordinal(&path) {
                files.push((ordinal, path));
            }
        }
        files.sort_by_key(|(ordinal, _)| *ordinal);

        let mut records = Vec::with_capacity(files.len());
        for (_, path) in files {
            let raw = fs::read(&path)
                .await
                .map_err(|e| StoreError::io(&path, e))?;
            let record = serde_json::from_slice(&raw)
                .map_err(|source| StoreError::Json { path, source })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Create the base directory if needed and continue the sequence after
    /// the highest ordinal left by earlier runs.
    pub async fn init(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| StoreError::io(&self.base_dir, e))?;

        let mut sequence = self.sequence.lock().await;
        if let Some(highest) = self.highest_ordinal().await? {
            *sequence = (*sequence).max(highest + 1);
        }
        info!(path = ?self.base_dir, next = *sequence, "Request store ready");
        Ok(())
    }

    async fn highest_ordinal(&self) -> Result<Option<u64>, StoreError> {
        let mut highest = None;
        let mut identities = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| StoreError::io(&self.base_dir, e))?;
        while let Some(identity) = identities
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.base_dir, e))?
        {
            let is_dir = identity
                .file_type()
                .await
                .map_err(|e| StoreError::io(identity.path(), e))?
                .is_dir();
            if !is_dir {
                continue;
            }
            let dir = identity.path();
            let mut records = fs::read_dir(&dir)
                .await
                .map_err(|e| StoreError::io(&dir, e))?;
            while let Some(record) = records
                .next_entry()
                .await
                .map_err(|e| StoreError::io(&dir, e))?
            {
                if let Some(ordinal) = record_ordinal(&record.path()) {
                    highest = highest.max(Some(ordinal));
                }
            }
        }
        Ok(highest)
    }

    fn identity_dir(&self, identity: Uuid) -> PathBuf {
        self.base_dir.join(identity.to_string())
    }
}

/// `.../17.json` -> 17
fn record_ordinal(path: &Path) -> Option<u64> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body;
    use hyper::Request;
    use std::sync::Arc;

    fn request(body: &'static str) -> InterceptedRequest {
        InterceptedRequest::new(
            Request::builder()
                .method("PUT")
                .uri("http://api.test/items/1?draft=true")
                .header("content-type", "application/json")
                .header("x-trace", "a")
                .header("x-trace", "b")
                .body(body::full(body))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let store = RequestStore::new(dir.path());
        let id = Uuid::new_v4();

        let mut req = request(r#"{"name":"widget"}"#);
        store.save(id, &mut req).await.unwrap();

        let records = store.find(id).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.url, "http://api.test/items/1?draft=true");
        assert_eq!(record.method, "PUT");
        assert_eq!(record.headers["Content-Type"], vec!["application/json"]);
        assert_eq!(record.headers["X-Trace"], vec!["a", "b"]);
        assert_eq!(
            BASE64.decode(&record.body_base64).unwrap(),
            br#"{"name":"widget"}"#
        );

        // Body stays available for whatever runs after the store.
        assert_eq!(req.body().await.unwrap(), r#"{"name":"widget"}"#);
        assert!(dir.path().join(id.to_string()).join("0.json").exists());
    }

    #[tokio::test]
    async fn test_find_unknown_identity_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RequestStore::new(dir.path().join("not-created-yet"));
        assert!(store.find(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let store = RequestStore::new(dir.path());
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();

        for i in 0..12 {
            let record = RecordedRequest {
                url: format!("http://host/{i}"),
                method: "GET".into(),
                headers: Default::default(),
                body_base64: String::new(),
            };
            // Interleave identities so ordinals are not contiguous.
            store.save_record(id, &record).await.unwrap();
            store.save_record(other, &record).await.unwrap();
        }

        let urls: Vec<String> = store
            .find(id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.url)
            .collect();
        let expected: Vec<String> = (0..12).map(|i| format!("http://host/{i}")).collect();
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn test_concurrent_saves_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RequestStore::new(dir.path()));
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = ids[i % ids.len()];
                tokio::spawn(async move {
                    let mut req = request("x");
                    store.save(id, &mut req).await.unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        for id in ids {
            assert_eq!(store.find(id).await.unwrap().len(), 10);
        }
    }

    #[tokio::test]
    async fn test_unwritable_base_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"").unwrap();

        let store = RequestStore::new(&file);
        let err = store.save(Uuid::new_v4(), &mut request("")).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    fn record(url: &str) -> RecordedRequest {
        RecordedRequest {
            url: url.to_string(),
            method: "GET".into(),
            headers: Default::default(),
            body_base64: String::new(),
        }
    }

    async fn urls(store: &RequestStore, id: Uuid) -> Vec<String> {
        store
            .find(id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.url)
            .collect()
    }

    #[tokio::test]
    async fn test_restart_continues_after_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();

        let first = RequestStore::new(dir.path());
        first.init().await.unwrap();
        first.save_record(id, &record("run1-a")).await.unwrap();
        first.save_record(id, &record("run1-b")).await.unwrap();

        let second = RequestStore::new(dir.path());
        second.init().await.unwrap();
        second.save_record(id, &record("run2-a")).await.unwrap();

        assert_eq!(urls(&second, id).await, ["run1-a", "run1-b", "run2-a"]);
        assert!(dir.path().join(id.to_string()).join("2.json").exists());
    }

    #[tokio::test]
    async fn test_existing_record_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();

        let first = RequestStore::new(dir.path());
        first.save_record(id, &record("old")).await.unwrap();

        // No init: the sequence starts at 0 and must skip the file on disk.
        let second = RequestStore::new(dir.path());
        second.save_record(id, &record("new")).await.unwrap();

        assert_eq!(urls(&second, id).await, ["old", "new"]);
    }

    #[test]
    fn test_record_ordinal() {
        assert_eq!(record_ordinal(Path::new("/a/b/17.json")), Some(17));
        assert_eq!(record_ordinal(Path::new("/a/b/17.tmp")), None);
        assert_eq!(record_ordinal(Path::new("/a/b/notes.json")), None);
    }
}
