//! Flat-file archive for composed evidence documents
//!
//! Each generation gets a fresh key, so older snapshots of the same
//! incident remain retrievable after re-generation.

use std::path::PathBuf;

use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct EvidenceArchive {
    dir: PathBuf,
}

impl EvidenceArchive {
    /// Create the archive directory if it does not exist yet.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Unavailable(format!("Cannot create archive dir: {}", e)))?;
        Ok(Self { dir })
    }

    /// Store a document under a fresh key and return the key.
    pub async fn put(&self, incident_id: &str, bytes: &[u8]) -> Result<String> {
        let token = Uuid::new_v4().simple().to_string();
        let key = format!("efir_{}_{}.txt", incident_id, &token[..8]);

        let path = self.dir.join(&key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Unavailable(format!("Cannot write evidence file: {}", e)))?;

        info!("Archived evidence {} ({} bytes)", key, bytes.len());
        Ok(key)
    }

    /// Fetch a document by its archive key.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Evidence {} not found", key)))
            }
            Err(e) => Err(Error::Unavailable(format!("Cannot read evidence file: {}", e))),
        }
    }
}
