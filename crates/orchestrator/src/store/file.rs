//! File-based store.
//!
//! Each key maps to `<root>/<segments...>.json` holding `{version, value}`.
//! The last version handed out is kept in `<root>/.version` so a deleted key
//! never gets an old version back.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use super::{check_version, key_segments, KeyValueStore, StoreEntry, StoreError};

const EXTENSION: &str = "json";
const VERSION_FILE: &str = ".version";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u64,
    value: String,
}

/// [`KeyValueStore`] persisted under a directory.
#[derive(Debug)]
pub struct FileStore {
    /// State directory.
    root: PathBuf,
    /// Serializes writers inside this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the state directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(key_segments(key)?
            .into_iter()
            .fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn file_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        // Append rather than replace: ids may contain dots.
        let mut path = self.dir_path(key)?.into_os_string();
        path.push(".");
        path.push(EXTENSION);
        Ok(PathBuf::from(path))
    }

    async fn read_envelope(path: &Path) -> Result<Option<Envelope>, StoreError> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn last_version(&self) -> Result<u64, StoreError> {
        match fs::read_to_string(self.root.join(VERSION_FILE)).await {
            Ok(content) => content.trim().parse().map_err(|_| {
                StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("corrupt version file: {content:?}"),
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Write `value` under the next store version. Callers hold `write_lock`.
    async fn write_next(
        &self,
        path: &Path,
        value: &str,
        found: Option<u64>,
    ) -> Result<u64, StoreError> {
        let version = self.last_version().await?.max(found.unwrap_or(0)) + 1;
        fs::create_dir_all(&self.root).await?;
        fs::write(self.root.join(VERSION_FILE), version.to_string()).await?;
        Self::write_envelope(
            path,
            &Envelope {
                version,
                value: value.to_string(),
            },
        )
        .await?;
        Ok(version)
    }

    async fn write_envelope(path: &Path, envelope: &Envelope) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_string_pretty(envelope)?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn put(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let path = self.file_path(key)?;
        let _guard = self.write_lock.lock().await;

        let found = Self::read_envelope(&path).await?.map(|e| e.version);
        self.write_next(&path, value, found).await
    }

    async fn put_if_version(
        &self,
        key: &str,
        value: &str,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let path = self.file_path(key)?;
        let _guard = self.write_lock.lock().await;

        let found = Self::read_envelope(&path).await?.map(|e| e.version);
        check_version(key, expected, found)?;
        self.write_next(&path, value, found).await
    }

    async fn get(&self, key: &str) -> Result<Option<StoreEntry>, StoreError> {
        let path = self.file_path(key)?;
        Ok(Self::read_envelope(&path).await?.map(|e| StoreEntry {
            key: key.to_string(),
            value: e.value,
            version: e.version,
        }))
    }

    async fn get_list(&self, prefix: &str, recursive: bool) -> Result<Vec<StoreEntry>, StoreError> {
        let base = prefix.trim_end_matches('/').to_string();
        let mut pending = vec![(self.dir_path(&base)?, base)];
        let mut entries = Vec::new();

        while let Some((dir, dir_key)) = pending.pop() {
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::Io(e)),
            };

            while let Some(item) = read_dir.next_entry().await? {
                let path = item.path();
                let file_type = item.file_type().await?;

                if file_type.is_dir() {
                    if recursive {
                        let name = item.file_name().to_string_lossy().into_owned();
                        pending.push((path, format!("{dir_key}/{name}")));
                    }
                } else if path.extension().is_some_and(|ext| ext == EXTENSION) {
                    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned())
                    else {
                        continue;
                    };
                    if let Some(envelope) = Self::read_envelope(&path).await? {
                        entries.push(StoreEntry {
                            key: format!("{dir_key}/{stem}"),
                            value: envelope.value,
                            version: envelope.version,
                        });
                    }
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.file_path(key)?;
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
