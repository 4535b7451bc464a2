//! Export bundles: a zip archive holding the notes as `data.json`
//! plus the asset tree under `assets/`.
use std::{
    io::{Cursor, Read, Write},
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{
    asset_path_string, write_bytes_atomic, AssetStorage, ExportSummary, LockedSet, Note,
    NoteError, NoteMap, Result,
};

/// Name of the metadata entry inside a bundle.
pub const METADATA_FILE: &str = "data.json";

/// Folder inside a bundle mirroring asset storage.
pub const ASSETS_FOLDER: &str = "assets";

/// One entry read back out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path, guaranteed not to escape the archive root
    pub path: PathBuf,
    pub is_dir: bool,
    pub bytes: Vec<u8>,
}

/// Builds and reads archives.
pub trait ArchiveCodec {
    /// An archive under construction.
    type Archive;

    fn create_archive(&self) -> Result<Self::Archive>;

    fn add_file(&self, archive: &mut Self::Archive, name: &str, bytes: &[u8]) -> Result<()>;

    fn add_directory(&self, archive: &mut Self::Archive, name: &str) -> Result<()>;

    /// Finishes the archive and returns its bytes.
    fn serialize(&self, archive: Self::Archive) -> Result<Vec<u8>>;

    /// Reads every entry of a serialized archive. Entries whose names would
    /// escape the archive root are dropped.
    fn read_entries(&self, bytes: &[u8]) -> Result<Vec<ArchiveEntry>>;

    /// Whether `bytes` look like an archive this codec produced.
    fn recognizes(&self, bytes: &[u8]) -> bool;
}

/// Deflate-compressed zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

impl ArchiveCodec for ZipCodec {
    type Archive = ZipWriter<Cursor<Vec<u8>>>;

    fn create_archive(&self) -> Result<Self::Archive> {
        Ok(ZipWriter::new(Cursor::new(Vec::new())))
    }

    fn add_file(&self, archive: &mut Self::Archive, name: &str, bytes: &[u8]) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        archive.start_file(name, options)?;
        archive.write_all(bytes)?;
        Ok(())
    }

    fn add_directory(&self, archive: &mut Self::Archive, name: &str) -> Result<()> {
        let options = SimpleFileOptions::default().unix_permissions(0o755);
        archive.add_directory(name, options)?;
        Ok(())
    }

    fn serialize(&self, archive: Self::Archive) -> Result<Vec<u8>> {
        Ok(archive.finish()?.into_inner())
    }

    fn read_entries(&self, bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let Some(path) = file.enclosed_name() else {
                warn!("Skipping archive entry outside the root: {}", file.name());
                continue;
            };

            let is_dir = file.is_dir();
            let mut content = Vec::new();
            if !is_dir {
                file.read_to_end(&mut content)?;
            }
            entries.push(ArchiveEntry {
                path,
                is_dir,
                bytes: content,
            });
        }
        Ok(entries)
    }

    fn recognizes(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"PK")
    }
}

#[derive(Serialize)]
struct BundleMetadata<'a> {
    data: BundleData<'a>,
    labels: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleData<'a> {
    notes: &'a NoteMap,
    locked_notes: LockedSet,
}

/// File name for a bundle exported on `date`.
pub fn archive_file_name(date: NaiveDate) -> String {
    format!("notebox_export_{}.zip", date.format("%Y-%m-%d"))
}

/// Labels in first-seen order over notes sorted by id.
fn bundle_labels(notes: &NoteMap) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for label in notes.values().flat_map(|note| note.labels.iter()) {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    labels
}

/// Serializes the metadata document written as `data.json`.
pub fn metadata_json(notes: &NoteMap) -> Result<Vec<u8>> {
    let metadata = BundleMetadata {
        data: BundleData {
            notes,
            locked_notes: LockedSet::from_notes(notes),
        },
        labels: bundle_labels(notes),
    };
    Ok(serde_json::to_vec_pretty(&metadata)?)
}

/// Builds an export bundle and writes it into `export_dir`.
///
/// The archive holds `data.json` and an `assets/` folder mirroring
/// `assets`. It is written to a temporary file first, so a failed export
/// leaves nothing behind.
pub fn export_bundle<C: ArchiveCodec>(
    codec: &C,
    notes: &NoteMap,
    assets: &dyn AssetStorage,
    export_dir: &Path,
) -> Result<ExportSummary> {
    let export_failed = |message: String| NoteError::ExportFailed { message };

    let mut archive = codec.create_archive()?;
    codec.add_file(&mut archive, METADATA_FILE, &metadata_json(notes)?)?;
    codec.add_directory(&mut archive, &format!("{}/", ASSETS_FOLDER))?;

    let files = assets.list_files()?;
    for file in &files {
        let bytes = assets.read_file(file)?;
        let name = format!("{}/{}", ASSETS_FOLDER, asset_path_string(file));
        debug!("Adding {} ({} bytes) to bundle", name, bytes.len());
        codec.add_file(&mut archive, &name, &bytes)?;
    }
    let bytes = codec.serialize(archive)?;

    let file_name = archive_file_name(Utc::now().date_naive());
    let path = export_dir.join(&file_name);
    write_bytes_atomic(&path, &bytes)
        .map_err(|e| export_failed(format!("writing {}: {}", path.display(), e)))?;

    info!(
        "Exported {} notes and {} assets to {}",
        notes.len(),
        files.len(),
        path.display()
    );

    Ok(ExportSummary {
        path,
        file_name,
        note_count: notes.len(),
        asset_count: files.len(),
    })
}

/// Contents of a parsed import bundle.
#[derive(Debug, Clone, Default)]
pub struct ImportedBundle {
    pub notes: NoteMap,
    /// Asset files as (path relative to the asset root, bytes)
    pub assets: Vec<(PathBuf, Vec<u8>)>,
}

/// Parses a bundle: either a zip produced by [`export_bundle`] or a bare
/// `data.json` document.
///
/// In a zip, `data.json` may sit at the root or inside a single top-level
/// folder; `assets/` is looked up next to it.
pub fn read_bundle<C: ArchiveCodec>(codec: &C, bytes: &[u8]) -> Result<ImportedBundle> {
    if !codec.recognizes(bytes) {
        debug!("Import source is not an archive, reading it as metadata");
        return Ok(ImportedBundle {
            notes: parse_metadata(bytes)?,
            assets: Vec::new(),
        });
    }

    let entries = codec.read_entries(bytes)?;
    let metadata = entries
        .iter()
        .filter(|e| !e.is_dir && e.path.file_name().is_some_and(|n| n == METADATA_FILE))
        .filter(|e| e.path.components().count() <= 2)
        .min_by_key(|e| e.path.components().count())
        .ok_or_else(|| NoteError::invalid_format(format!("bundle has no {}", METADATA_FILE)))?;

    let notes = parse_metadata(&metadata.bytes)?;
    let root = metadata.path.parent().unwrap_or(Path::new(""));
    let assets_root = root.join(ASSETS_FOLDER);

    let assets = entries
        .iter()
        .filter(|e| !e.is_dir)
        .filter_map(|e| {
            e.path
                .strip_prefix(&assets_root)
                .ok()
                .filter(|rel| rel.components().count() > 0)
                .map(|rel| (rel.to_path_buf(), e.bytes.clone()))
        })
        .collect::<Vec<_>>();

    debug!(
        "Bundle holds {} notes and {} assets",
        notes.len(),
        assets.len()
    );
    Ok(ImportedBundle { notes, assets })
}

/// Decodes `{ "data": { "notes": { id: note } } }`.
///
/// Map keys are authoritative: a record whose own `id` differs is re-keyed.
pub fn parse_metadata(bytes: &[u8]) -> Result<NoteMap> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|e| NoteError::invalid_format(format!("unparseable metadata: {}", e)))?;
    let records = root
        .get("data")
        .and_then(|data| data.get("notes"))
        .and_then(Value::as_object)
        .ok_or_else(|| NoteError::invalid_format("metadata has no data.notes"))?;

    let mut notes = NoteMap::new();
    for (id, record) in records {
        let mut note: Note = serde_json::from_value(record.clone())
            .map_err(|e| NoteError::invalid_format(format!("note {}: {}", id, e)))?;
        note.id = id.clone();
        notes.insert(id.clone(), note);
    }
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Document, ErrorKind, FsAssetStorage};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_notes() -> NoteMap {
        let mut a = Note::new(Some("Alpha"));
        a.id = "a".to_string();
        a.labels = vec!["work".to_string(), "home".to_string()];
        a.is_locked = true;
        let mut b = Note::new(Some("Beta"));
        b.id = "b".to_string();
        b.labels = vec!["ideas".to_string(), "work".to_string()];
        b.content = Document::from_plain_text("beta body");
        [("a".to_string(), a), ("b".to_string(), b)].into_iter().collect()
    }

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn test_archive_file_name_uses_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(archive_file_name(date), "notebox_export_2024-03-09.zip");
    }

    #[test]
    fn test_export_shape() {
        let dir = TempDir::new().unwrap();
        let assets = FsAssetStorage::new(dir.path().join("assets"));
        assets
            .write_file(Path::new("file-assets/a/1_pic.png"), b"png")
            .unwrap();

        let notes = sample_notes();
        let summary = export_bundle(&ZipCodec, &notes, &assets, &dir.path().join("out")).unwrap();
        assert_eq!(summary.note_count, 2);
        assert_eq!(summary.asset_count, 1);
        assert_eq!(
            summary.path.file_name().unwrap().to_string_lossy(),
            summary.file_name
        );

        let bytes = std::fs::read(&summary.path).unwrap();
        let names = entry_names(&bytes);
        assert!(names.contains(&"data.json".to_string()));
        assert!(names.contains(&"assets/".to_string()));
        assert!(names.contains(&"assets/file-assets/a/1_pic.png".to_string()));

        let entries = ZipCodec.read_entries(&bytes).unwrap();
        let data = entries
            .iter()
            .find(|e| e.path == Path::new("data.json"))
            .unwrap();
        let metadata: Value = serde_json::from_slice(&data.bytes).unwrap();
        assert_eq!(metadata["data"]["lockedNotes"], json!({"a": true}));
        assert_eq!(metadata["labels"], json!(["work", "home", "ideas"]));
        assert!(metadata["data"]["notes"]["b"]["updatedAt"].is_i64());
        assert!(String::from_utf8_lossy(&data.bytes).contains("\n  \"data\""));
    }

    #[test]
    fn test_export_without_assets_keeps_empty_folder() {
        let dir = TempDir::new().unwrap();
        let assets = FsAssetStorage::new(dir.path().join("missing"));
        let summary =
            export_bundle(&ZipCodec, &NoteMap::new(), &assets, dir.path()).unwrap();
        let names = entry_names(&std::fs::read(&summary.path).unwrap());
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"assets/".to_string()));
    }

    #[test]
    fn test_export_fails_when_assets_cannot_be_listed() {
        use crate::{AssetEntry, AssetStat};

        struct Unlistable;
        impl AssetStorage for Unlistable {
            fn mkdir(&self, _: &Path) -> Result<()> {
                Ok(())
            }
            fn stat(&self, _: &Path) -> Result<Option<AssetStat>> {
                Ok(None)
            }
            fn read_file(&self, _: &Path) -> Result<Vec<u8>> {
                Ok(Vec::new())
            }
            fn write_file(&self, _: &Path, _: &[u8]) -> Result<()> {
                Ok(())
            }
            fn readdir(&self, _: &Path) -> Result<Vec<AssetEntry>> {
                Ok(Vec::new())
            }
            fn copy(&self, _: &Path, _: &Path) -> Result<()> {
                Ok(())
            }
            fn list_files(&self) -> Result<Vec<PathBuf>> {
                Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "sealed").into())
            }
        }

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let err = export_bundle(&ZipCodec, &sample_notes(), &Unlistable, &out).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(!out.exists());
    }

    #[test]
    fn test_read_bundle_from_export() {
        let dir = TempDir::new().unwrap();
        let assets = FsAssetStorage::new(dir.path().join("assets"));
        assets.write_file(Path::new("img/x.jpg"), b"jpg").unwrap();
        let notes = sample_notes();
        let summary = export_bundle(&ZipCodec, &notes, &assets, dir.path()).unwrap();

        let bundle = read_bundle(&ZipCodec, &std::fs::read(&summary.path).unwrap()).unwrap();
        assert_eq!(bundle.notes, notes);
        assert_eq!(bundle.assets, vec![(PathBuf::from("img/x.jpg"), b"jpg".to_vec())]);
    }

    #[test]
    fn test_read_bundle_nested_folder() {
        let codec = ZipCodec;
        let mut archive = codec.create_archive().unwrap();
        let metadata = json!({"data": {"notes": {"n1": {"title": "Nested", "createdAt": 5}}}});
        codec
            .add_file(&mut archive, "export/data.json", metadata.to_string().as_bytes())
            .unwrap();
        codec
            .add_file(&mut archive, "export/assets/doc.txt", b"hi")
            .unwrap();
        let bytes = codec.serialize(archive).unwrap();

        let bundle = read_bundle(&codec, &bytes).unwrap();
        assert_eq!(bundle.notes["n1"].id, "n1");
        assert_eq!(bundle.notes["n1"].created_at.timestamp_millis(), 5);
        assert_eq!(bundle.assets[0].0, PathBuf::from("doc.txt"));
    }

    #[test]
    fn test_read_bare_json() {
        let raw = json!({"data": {"notes": {"k": {"id": "other", "title": "T"}}}, "labels": []});
        let bundle = read_bundle(&ZipCodec, raw.to_string().as_bytes()).unwrap();
        assert_eq!(bundle.notes["k"].id, "k");
        assert!(bundle.assets.is_empty());
    }

    #[test]
    fn test_invalid_inputs() {
        let missing = read_bundle(&ZipCodec, br#"{"data": {}}"#).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::InvalidFormat);

        let garbage = read_bundle(&ZipCodec, b"not json at all").unwrap_err();
        assert_eq!(garbage.kind(), ErrorKind::InvalidFormat);

        let codec = ZipCodec;
        let mut archive = codec.create_archive().unwrap();
        codec.add_file(&mut archive, "readme.txt", b"x").unwrap();
        let no_metadata = read_bundle(&codec, &codec.serialize(archive).unwrap()).unwrap_err();
        assert_eq!(no_metadata.kind(), ErrorKind::InvalidFormat);
    }
}
