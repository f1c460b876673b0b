//! Vault file storage
//!
//! All paths are vault-relative, `/`-separated strings. The engine only ever
//! talks to a [`FileStore`]; [`LocalFileStore`] maps it onto a directory on
//! disk and [`MemoryFileStore`] keeps everything in process.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

use crate::core::path as vault_path;

/// Storage failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
            _ => StorageError::Io {
                path: path.to_string(),
                source,
            },
        }
    }
}

/// Options for [`FileStore::write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Create missing parent folders
    pub create_directories: bool,
    /// Replace an existing file
    pub overwrite: bool,
}

impl WriteOptions {
    /// Create parents and overwrite; used for step outputs
    pub fn replace() -> Self {
        Self {
            create_directories: true,
            overwrite: true,
        }
    }
}

/// One entry of a folder listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Vault-relative path of the entry
    pub path: String,
    pub name: String,
    pub is_dir: bool,
}

/// Storage operations the engine needs from the host
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    async fn is_directory(&self, path: &str) -> Result<bool, StorageError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn read_to_string(&self, path: &str) -> Result<String, StorageError> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|e| StorageError::Io {
            path: path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
    }

    async fn write(
        &self,
        path: &str,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<(), StorageError>;

    /// Create a folder (and its parents); fails if a file is in the way
    async fn ensure_directory(&self, path: &str) -> Result<(), StorageError>;

    /// Move a file; fails if the target already exists
    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Direct children of a folder
    async fn list_children(&self, path: &str) -> Result<Vec<DirEntry>, StorageError>;
}

/// [`FileStore`] backed by a directory on disk
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            full.push(segment);
        }
        full
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        tokio::fs::try_exists(self.full_path(path))
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn is_directory(&self, path: &str) -> Result<bool, StorageError> {
        match tokio::fs::metadata(self.full_path(path)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(self.full_path(path))
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn write(
        &self,
        path: &str,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<(), StorageError> {
        let full = self.full_path(path);
        if !options.overwrite && self.exists(path).await? {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        if options.create_directories {
            let parent = vault_path::parent(path);
            if !parent.is_empty() {
                self.ensure_directory(parent).await?;
            }
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        debug!("Wrote {} bytes to {}", content.len(), full.display());
        Ok(())
    }

    async fn ensure_directory(&self, path: &str) -> Result<(), StorageError> {
        let full = self.full_path(path);
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => return Err(StorageError::NotADirectory(path.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(path, e)),
        }
        tokio::fs::create_dir_all(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => StorageError::NotADirectory(path.to_string()),
            _ => StorageError::io(path, e),
        })
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        if !self.exists(from).await? {
            return Err(StorageError::NotFound(from.to_string()));
        }
        if self.exists(to).await? {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        tokio::fs::rename(self.full_path(from), self.full_path(to))
            .await
            .map_err(|e| StorageError::io(from, e))
    }

    async fn list_children(&self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        let mut reader = tokio::fs::read_dir(self.full_path(path))
            .await
            .map_err(|e| StorageError::io(path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| StorageError::io(path, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .map_err(|e| StorageError::io(path, e))?;
            entries.push(DirEntry {
                path: vault_path::join(path, &name),
                name,
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    renames: Vec<(String, String)>,
    fail_renames: bool,
}

/// In-process [`FileStore`]; records every rename
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    inner: Arc<Mutex<MemoryInner>>,
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a file, creating its parent folders
    pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
        let path = normalize(path);
        let mut inner = self.lock();
        add_parents(&mut inner.dirs, &path);
        inner.files.insert(path, content.into());
    }

    /// Seed an empty folder
    pub fn insert_dir(&self, path: &str) {
        let path = normalize(path);
        let mut inner = self.lock();
        add_parents(&mut inner.dirs, &path);
        inner.dirs.insert(path);
    }

    pub fn contents(&self, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(&normalize(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Every `(from, to)` rename performed, in order
    pub fn renames(&self) -> Vec<(String, String)> {
        self.lock().renames.clone()
    }

    /// Make every later rename fail with an I/O error
    pub fn fail_renames(&self, fail: bool) {
        self.lock().fail_renames = fail;
    }
}

fn add_parents(dirs: &mut BTreeSet<String>, path: &str) {
    let mut current = vault_path::parent(path);
    while !current.is_empty() {
        dirs.insert(current.to_string());
        current = vault_path::parent(current);
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let path = normalize(path);
        let inner = self.lock();
        Ok(path.is_empty() || inner.files.contains_key(&path) || inner.dirs.contains(&path))
    }

    async fn is_directory(&self, path: &str) -> Result<bool, StorageError> {
        let path = normalize(path);
        Ok(path.is_empty() || self.lock().dirs.contains(&path))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()
            .files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn write(
        &self,
        path: &str,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<(), StorageError> {
        let path = normalize(path);
        let mut inner = self.lock();
        if inner.dirs.contains(&path) {
            return Err(StorageError::AlreadyExists(path));
        }
        if !options.overwrite && inner.files.contains_key(&path) {
            return Err(StorageError::AlreadyExists(path));
        }
        let parent = vault_path::parent(&path).to_string();
        if !parent.is_empty() && !inner.dirs.contains(&parent) {
            if !options.create_directories {
                return Err(StorageError::NotFound(parent));
            }
            if inner.files.contains_key(&parent) {
                return Err(StorageError::NotADirectory(parent));
            }
            add_parents(&mut inner.dirs, &path);
        }
        inner.files.insert(path, content.to_vec());
        Ok(())
    }

    async fn ensure_directory(&self, path: &str) -> Result<(), StorageError> {
        let path = normalize(path);
        let mut inner = self.lock();
        if inner.files.contains_key(&path) {
            return Err(StorageError::NotADirectory(path));
        }
        add_parents(&mut inner.dirs, &path);
        if !path.is_empty() {
            inner.dirs.insert(path);
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let (from, to) = (normalize(from), normalize(to));
        let mut inner = self.lock();
        if inner.fail_renames {
            return Err(StorageError::Io {
                path: from,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "rename refused"),
            });
        }
        if inner.files.contains_key(&to) || inner.dirs.contains(&to) {
            return Err(StorageError::AlreadyExists(to));
        }
        let content = inner
            .files
            .remove(&from)
            .ok_or_else(|| StorageError::NotFound(from.clone()))?;
        add_parents(&mut inner.dirs, &to);
        inner.files.insert(to.clone(), content);
        inner.renames.push((from, to));
        Ok(())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        let dir = normalize(path);
        let inner = self.lock();
        if !dir.is_empty() && !inner.dirs.contains(&dir) {
            return Err(if inner.files.contains_key(&dir) {
                StorageError::NotADirectory(dir)
            } else {
                StorageError::NotFound(dir)
            });
        }
        let children = inner
            .dirs
            .iter()
            .map(|d| (d, true))
            .chain(inner.files.keys().map(|f| (f, false)))
            .filter(|(p, _)| vault_path::parent(p) == dir)
            .map(|(p, is_dir)| DirEntry {
                path: p.clone(),
                name: vault_path::basename(p).to_string(),
                is_dir,
            });
        let mut entries: Vec<DirEntry> = children.collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
