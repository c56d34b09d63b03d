//! Authoritative in-memory filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::path::normalize_and_anonymize;
use crate::{FileEntry, FileInfo, Fs, FsError, FsResult};

/// A sorted map from normalized path to file contents. Directories are
/// implicit: any strict prefix of a stored path that ends at a `/` exists
/// as a directory. The root directory always exists.
#[derive(Debug, Default)]
pub struct InMemoryFs {
    files: RwLock<BTreeMap<String, FileEntry>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `path` only if no file is stored there yet. Returns whether
    /// this call populated the entry. Used by the cache-on-read layer to
    /// make concurrent first reads populate at most once.
    pub(crate) fn write_if_absent(&self, path: &str, data: &[u8], mode: u32) -> bool {
        let path = normalize_and_anonymize(path);
        let mut files = self.files.write().expect("filesystem lock poisoned");
        if files.contains_key(&path) {
            return false;
        }
        files.insert(
            path,
            FileEntry {
                data: data.to_vec(),
                mode,
            },
        );
        true
    }

    fn base_name(path: &str) -> String {
        path.rsplit('/').next().unwrap_or("").to_string()
    }

    /// Whether any stored file lives underneath `path`.
    fn has_children(files: &BTreeMap<String, FileEntry>, path: &str) -> bool {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        files.range(prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&prefix))
    }
}

impl Fs for InMemoryFs {
    fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        let path = normalize_and_anonymize(path);
        let files = self.files.read().expect("filesystem lock poisoned");
        if let Some(entry) = files.get(&path) {
            return Ok(entry.data.clone());
        }
        if path == "/" || Self::has_children(&files, &path) {
            return Err(FsError::IsDir { path });
        }
        Err(FsError::NotFound { path })
    }

    fn write(&self, path: &str, data: &[u8], mode: u32) -> FsResult<()> {
        let path = normalize_and_anonymize(path);
        let mut files = self.files.write().expect("filesystem lock poisoned");
        files.insert(
            path,
            FileEntry {
                data: data.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let path = normalize_and_anonymize(path);
        let files = self.files.read().expect("filesystem lock poisoned");
        if let Some(entry) = files.get(&path) {
            return Ok(FileInfo {
                name: Self::base_name(&path),
                size: entry.data.len() as u64,
                mode: entry.mode,
                is_dir: false,
            });
        }
        if path == "/" || Self::has_children(&files, &path) {
            return Ok(FileInfo {
                name: Self::base_name(&path),
                size: 0,
                mode: 0o755,
                is_dir: true,
            });
        }
        Err(FsError::NotFound { path })
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let path = normalize_and_anonymize(path);
        let files = self.files.read().expect("filesystem lock poisoned");
        if files.contains_key(&path) {
            return Err(FsError::NotDir { path });
        }
        if path != "/" && !Self::has_children(&files, &path) {
            return Err(FsError::NotFound { path });
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut dirs = BTreeSet::new();
        let mut infos = Vec::new();
        for (stored, entry) in files.range(prefix.clone()..) {
            let Some(rest) = stored.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                // Direct child file.
                None => infos.push(FileInfo {
                    name: rest.to_string(),
                    size: entry.data.len() as u64,
                    mode: entry.mode,
                    is_dir: false,
                }),
                Some((child, _)) => {
                    dirs.insert(child.to_string());
                }
            }
        }
        for name in dirs {
            infos.push(FileInfo {
                name,
                size: 0,
                mode: 0o755,
                is_dir: true,
            });
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    fn is_dir(&self, path: &str) -> FsResult<bool> {
        self.stat(path).map(|info| info.is_dir)
    }

    fn snapshot(&self) -> BTreeMap<String, FileEntry> {
        self.files.read().expect("filesystem lock poisoned").clone()
    }
}
