// # File Store
//
// File-based implementation of the repository traits with crash recovery.
//
// ## Purpose
//
// Keeps gateway records across daemon restarts without an external database.
// Every mutation is written through before it becomes visible.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good document
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "tables": {
//     "interfaces": { "1": { "ID": 1, "name": "lan", "device": "em0", ... } },
//     "ips": { "1": { "ID": 1, "ip": "192.168.1.10", "prefix": 24, "ifid": 1, ... } },
//     "last_ids": { "interface": 1, "ip": 1 }
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::tables::{TableEntity, Tables};
use crate::error::{Error, Result};
use crate::model::{ChildEntity, RecordId};
use crate::traits::{ChildRepository, Repository};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based record store with crash recovery
///
/// A mutation is applied to a copy of the tables, written to disk, and only
/// then swapped in. A failed write leaves both the file and the in-memory
/// tables unchanged and surfaces as `Error::Persistence`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: RwLock<Tables>,
}

/// Serializable store file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    tables: Tables,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing store file
    /// 3. If it is corrupted, try to load the backup
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let tables = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store file, falling back to the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<Tables> {
        let err = match Self::load(path).await {
            Ok(tables) => {
                tracing::debug!("Loaded store from file: {} records", tables.len());
                return Ok(tables);
            }
            Err(e @ Error::Json(_)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "Store file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty store.");
            return Ok(Tables::new());
        }

        match Self::load(&backup_path).await {
            Ok(tables) => {
                tracing::info!("Recovered store from backup: {} records", tables.len());
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore store file from backup: {}", restore_err);
                }
                Ok(tables)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty store.",
                    backup_err
                );
                Ok(Tables::new())
            }
        }
    }

    async fn load(path: &Path) -> Result<Tables> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(Tables::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::persistence(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;
        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.tables)
    }

    /// Apply `change` to a copy, write it through, then publish it
    async fn mutate<R: Send>(
        &self,
        change: impl FnOnce(&mut Tables) -> Result<R> + Send,
    ) -> Result<R> {
        let mut guard = self.tables.write().await;
        let mut next = guard.clone();
        let result = change(&mut next)?;
        self.write(&next).await?;
        *guard = next;
        Ok(result)
    }

    /// Write the document atomically, keeping the previous one as backup
    async fn write(&self, tables: &Tables) -> Result<()> {
        let document = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            tables: tables.clone(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| Error::persistence(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.temp_path();
        let io_err = |action: &str, e: std::io::Error| {
            Error::persistence(format!("Failed to {} {}: {}", action, temp_path.display(), e))
        };
        {
            let mut file = fs::File::create(&temp_path)
                .await
                .map_err(|e| io_err("create", e))?;
            file.write_all(json.as_bytes())
                .await
                .map_err(|e| io_err("write", e))?;
            file.flush().await.map_err(|e| io_err("flush", e))?;
            file.sync_all().await.map_err(|e| io_err("sync", e))?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl<T: TableEntity> Repository<T> for FileStore {
    async fn create(&self, record: T) -> Result<T> {
        self.mutate(move |tables| Ok(tables.insert(record))).await
    }

    async fn update(&self, record: T) -> Result<T> {
        self.mutate(move |tables| tables.replace(record)).await
    }

    async fn delete(&self, id: RecordId) -> Result<T> {
        self.mutate(move |tables| tables.remove(id)).await
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<T>> {
        Ok(self.tables.read().await.get(id))
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        Ok(self.tables.read().await.all())
    }
}

#[async_trait]
impl<C> ChildRepository<C> for FileStore
where
    C: ChildEntity + TableEntity,
    C::Parent: TableEntity,
{
    async fn find_by_foreign_key(&self, parent: RecordId) -> Result<Vec<C>> {
        Ok(self.tables.read().await.children(parent))
    }
}
