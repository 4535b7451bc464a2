//! Asset storage: images and attachments referenced from notes.
//!
//! Paths handed to an [`AssetStorage`] are relative to its root and may not
//! leave it.
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use log::{debug, info};
use walkdir::WalkDir;

use crate::{now_millis, write_bytes_atomic, NoteError, Result};

/// Directory under the asset root holding per-note attachments.
pub const FILE_ASSETS_DIR: &str = "file-assets";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetStat {
    pub is_dir: bool,
    pub len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Filesystem-like storage for asset files.
pub trait AssetStorage: Send + Sync {
    /// Creates `path` and any missing parents.
    fn mkdir(&self, path: &Path) -> Result<()>;

    /// `None` when nothing exists at `path`.
    fn stat(&self, path: &Path) -> Result<Option<AssetStat>>;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Writes a file, creating parent directories.
    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Immediate children of a directory, sorted by name.
    fn readdir(&self, path: &Path) -> Result<Vec<AssetEntry>>;

    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    /// Every file below the root, as sorted relative paths.
    fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![PathBuf::new()];
        while let Some(dir) = pending.pop() {
            if self.stat(&dir)?.is_none() {
                continue;
            }
            for entry in self.readdir(&dir)? {
                let path = dir.join(&entry.name);
                if entry.is_dir {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// [`AssetStorage`] over a directory on disk.
#[derive(Debug, Clone)]
pub struct FsAssetStorage {
    root: PathBuf,
}

impl FsAssetStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsAssetStorage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative: &Path) -> Result<PathBuf> {
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(NoteError::UnsafeAssetPath {
                path: relative.display().to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl AssetStorage for FsAssetStorage {
    fn mkdir(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).map_err(|_| NoteError::DirectoryError { path: full })
    }

    fn stat(&self, path: &Path) -> Result<Option<AssetStat>> {
        let full = self.resolve(path)?;
        match fs::metadata(&full) {
            Ok(meta) => Ok(Some(AssetStat {
                is_dir: meta.is_dir(),
                len: meta.len(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(path)?)?)
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        write_bytes_atomic(&full, bytes)?;
        debug!("Wrote asset {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn readdir(&self, path: &Path) -> Result<Vec<AssetEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            entries.push(AssetEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let bytes = self.read_file(from)?;
        self.write_file(to, &bytes)
    }

    fn list_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                files.push(relative.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Stores an attachment for `note_id` as
/// `file-assets/<note_id>/<millis>_<file_name>` and returns that path.
pub fn save_note_asset(
    storage: &dyn AssetStorage,
    note_id: &str,
    file_name: &str,
    bytes: &[u8],
) -> Result<PathBuf> {
    let base_name = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| NoteError::invalid_format(format!("not a file name: {:?}", file_name)))?;

    let dir = Path::new(FILE_ASSETS_DIR).join(note_id);
    storage.mkdir(&dir)?;
    let path = dir.join(format!("{}_{}", now_millis().timestamp_millis(), base_name));
    storage.write_file(&path, bytes)?;
    info!("Stored attachment {} for note {}", path.display(), note_id);
    Ok(path)
}

/// Forward-slash form of a relative asset path, for archives and links.
pub fn asset_path_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
