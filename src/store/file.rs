//! File-backed document store
//!
//! Layout: `<data_dir>/<collection>/<id>.json`. Upserts write a temp file and
//! rename it into place. Inserts hard-link the temp file to the final name,
//! which fails atomically when the document already exists.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::{validate_id, DocumentStore};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create) a store rooted at `root`.
    ///
    /// Fails with `StoreUnavailable` if the directory cannot be created or
    /// written.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let unavailable = |e: std::io::Error| Error::store_unavailable(root.display().to_string(), e.to_string());

        std::fs::create_dir_all(&root).map_err(unavailable)?;

        let probe = root.join(format!(".probe-{}", Uuid::new_v4()));
        std::fs::write(&probe, b"ok").map_err(unavailable)?;
        std::fs::remove_file(&probe).map_err(unavailable)?;

        debug!(root = %root.display(), "Document store opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    fn doc_path(&self, collection: &str, id: &str) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.{}", id, EXTENSION))
    }

    /// Serialize to a temp file inside the collection directory
    async fn write_temp(&self, collection: &str, doc: &Value) -> Result<PathBuf> {
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir).await.map_err(|e| Error::IoWrite {
            path: dir.clone(),
            source: e,
        })?;

        let tmp = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let bytes = serde_json::to_vec_pretty(doc)?;
        fs::write(&tmp, bytes).await.map_err(|e| Error::IoWrite {
            path: tmp.clone(),
            source: e,
        })?;
        Ok(tmp)
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        validate_id(collection, id)?;
        let tmp = self.write_temp(collection, &doc).await?;
        let path = self.doc_path(collection, id);

        let linked = fs::hard_link(&tmp, &path).await;
        if let Err(e) = fs::remove_file(&tmp).await {
            warn!(path = %tmp.display(), error = %e, "Failed to remove temp file");
        }

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::StoreDuplicate {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(Error::IoWrite { path, source: e }),
        }
    }

    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        validate_id(collection, id)?;
        let tmp = self.write_temp(collection, &doc).await?;
        let path = self.doc_path(collection, id);
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::IoWrite { path, source: e })
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        validate_id(collection, id)?;
        let path = self.doc_path(collection, id);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::StoreCorrupt {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    message: e.to_string(),
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::IoRead { path, source: e }),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>> {
        let dir = self.collection_dir(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::IoRead { path: dir, source: e }),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::IoRead {
            path: dir.clone(),
            source: e,
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();

        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.get(collection, &id).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }
}
