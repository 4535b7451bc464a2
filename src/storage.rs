//! Persistence gateway for the note store and the locked-set store.
//!
//! All writes are serialized through one queue and land atomically.
use std::{
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;

use crate::{write_json_atomic, Config, LockedSet, Note, NoteMap, NoteRepository, Result};

/// On-disk shape of the primary store: `{ "data": { "notes": { id: note } } }`.
#[derive(Serialize)]
struct StoreFile<'a> {
    data: StoreData<'a>,
}

#[derive(Serialize)]
struct StoreData<'a> {
    notes: &'a NoteMap,
}

/// Reads and writes the note store and the locked-set store.
///
/// Every write goes through a FIFO queue (a fair async mutex) so that each
/// logical mutation sees the result of the previous one. Loads are soft: a
/// store that cannot be read yields an empty map instead of an error.
#[derive(Debug, Clone)]
pub struct StoreGateway {
    /// Primary store file
    store_file: PathBuf,
    /// Secondary locked-set file
    locked_file: PathBuf,
    /// Single writer queue
    queue: Arc<TokioMutex<()>>,
}

impl StoreGateway {
    pub fn new(config: &Config) -> Self {
        Self::from_paths(&config.store_file, &config.locked_notes_file)
    }

    pub fn from_paths(store_file: impl Into<PathBuf>, locked_file: impl Into<PathBuf>) -> Self {
        StoreGateway {
            store_file: store_file.into(),
            locked_file: locked_file.into(),
            queue: Arc::new(TokioMutex::new(())),
        }
    }

    pub fn store_file(&self) -> &Path {
        &self.store_file
    }

    pub fn locked_file(&self) -> &Path {
        &self.locked_file
    }

    /// Loads every readable note from the primary store.
    ///
    /// A missing, empty or garbled file, or one without `data.notes`, gives
    /// an empty map. Records that fail to decode are skipped. When the file
    /// exists but could not be read in full, a copy is kept next to it as
    /// `<name>.corrupt-<timestamp>` so a later save cannot destroy it.
    pub fn load(&self) -> NoteMap {
        let raw = match fs::read(&self.store_file) {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!("No store at {}, starting empty", self.store_file.display());
                return NoteMap::new();
            }
            Err(e) => {
                warn!("Failed to read store {}: {}", self.store_file.display(), e);
                return NoteMap::new();
            }
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            debug!("Store {} is empty", self.store_file.display());
            return NoteMap::new();
        }

        match parse_store(&raw) {
            Ok((notes, skipped)) => {
                if skipped > 0 {
                    error!(
                        "Skipped {} malformed note records in {}",
                        skipped,
                        self.store_file.display()
                    );
                    self.preserve_corrupt_store(&raw);
                }
                debug!("Loaded {} notes from {}", notes.len(), self.store_file.display());
                notes
            }
            Err(reason) => {
                warn!(
                    "Store {} is unreadable ({}), starting empty",
                    self.store_file.display(),
                    reason
                );
                self.preserve_corrupt_store(&raw);
                NoteMap::new()
            }
        }
    }

    /// Loads the locked-set; anything unreadable gives an empty set, which
    /// is then repaired from the note flags.
    pub fn load_locked_set(&self) -> LockedSet {
        let raw = match fs::read(&self.locked_file) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != IoErrorKind::NotFound {
                    warn!("Failed to read locked-set {}: {}", self.locked_file.display(), e);
                }
                return LockedSet::new();
            }
        };

        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            warn!("Locked-set {} is unreadable: {}", self.locked_file.display(), e);
            LockedSet::new()
        })
    }

    /// Loads both stores under the queue and hydrates a repository from them.
    ///
    /// A locked-set that disagrees with the note flags is repaired and
    /// flushed back.
    pub async fn snapshot(&self) -> NoteRepository {
        let _guard = self.queue.lock().await;
        let (repository, repaired) = self.hydrate();
        if repaired > 0 {
            if let Err(e) = self.write_locked_set(repository.locked_set()) {
                warn!("Failed to flush repaired locked-set: {}", e);
            }
        }
        repository
    }

    /// Overwrites both stores with `notes`, deriving the locked-set from the
    /// note flags.
    pub async fn save(&self, notes: &NoteMap) -> Result<()> {
        let _guard = self.queue.lock().await;
        self.write_notes(notes)?;
        self.write_locked_set(&LockedSet::from_notes(notes))
    }

    /// Runs one logical mutation: fresh load, apply `f`, flush.
    ///
    /// The queue is held throughout, so concurrent mutations are applied one
    /// after another in arrival order. If `f` fails nothing is written.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut NoteRepository) -> Result<T>,
    {
        let _guard = self.queue.lock().await;
        let (mut repository, _) = self.hydrate();

        let value = f(&mut repository)?;

        trace!("Flushing {} notes after mutation", repository.len());
        self.write_notes(repository.notes())?;
        if let Err(e) = self.write_locked_set(repository.locked_set()) {
            warn!(
                "Saved notes but failed to save locked-set {}: {}",
                self.locked_file.display(),
                e
            );
            return Err(e);
        }
        Ok(value)
    }

    fn hydrate(&self) -> (NoteRepository, usize) {
        NoteRepository::from_parts(self.load(), self.load_locked_set())
    }

    fn write_notes(&self, notes: &NoteMap) -> Result<()> {
        let file = StoreFile {
            data: StoreData { notes },
        };
        write_json_atomic(&self.store_file, &file, true)?;
        info!("Saved {} notes to {}", notes.len(), self.store_file.display());
        Ok(())
    }

    fn write_locked_set(&self, locked: &LockedSet) -> Result<()> {
        write_json_atomic(&self.locked_file, locked, false)?;
        debug!(
            "Saved {} locked ids to {}",
            locked.len(),
            self.locked_file.display()
        );
        Ok(())
    }

    /// Keeps a copy of an unreadable store next to it. Content that already
    /// has a copy is not copied again.
    fn preserve_corrupt_store(&self, raw: &[u8]) {
        let (Some(dir), Some(file_name)) = (self.store_file.parent(), self.store_file.file_name())
        else {
            return;
        };
        let prefix = format!("{}.corrupt-", file_name.to_string_lossy());

        let already_kept = fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
                    .any(|e| fs::read(e.path()).is_ok_and(|kept| kept == raw))
            })
            .unwrap_or(false);
        if already_kept {
            debug!("Unreadable store content already has a copy");
            return;
        }

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let backup = dir.join(format!("{}{}", prefix, stamp));
        match fs::write(&backup, raw) {
            Ok(()) => warn!("Kept a copy of the unreadable store at {}", backup.display()),
            Err(e) => error!("Failed to keep a copy of the unreadable store: {}", e),
        }
    }
}

/// Decodes the primary store, returning the notes and how many records were
/// skipped.
fn parse_store(raw: &[u8]) -> std::result::Result<(NoteMap, usize), String> {
    let root: Value = serde_json::from_slice(raw).map_err(|e| e.to_string())?;
    let records = root
        .get("data")
        .and_then(|data| data.get("notes"))
        .and_then(Value::as_object)
        .ok_or_else(|| "missing data.notes".to_string())?;

    let mut notes = NoteMap::new();
    let mut skipped = 0;
    for (id, record) in records {
        match serde_json::from_value::<Note>(record.clone()) {
            Ok(mut note) => {
                if note.id != *id {
                    debug!("Record keyed {} carried id {:?}; using key", id, note.id);
                    note.id = id.clone();
                }
                notes.insert(id.clone(), note);
            }
            Err(e) => {
                warn!("Skipping malformed note {}: {}", id, e);
                skipped += 1;
            }
        }
    }
    Ok((notes, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Document, ErrorKind, NoteFlag};
    use serde_json::json;
    use tempfile::TempDir;

    fn gateway(dir: &TempDir) -> StoreGateway {
        StoreGateway::from_paths(
            dir.path().join("notes").join("data.json"),
            dir.path().join("locked_notes.json"),
        )
    }

    fn corrupt_copies(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .count()
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = gateway(&dir);

        let mut note = Note::new(Some("Groceries"));
        note.content = Document::from_plain_text("milk\neggs");
        note.labels = vec!["home".to_string()];
        note.is_bookmarked = true;
        let notes: NoteMap = [(note.id.clone(), note)].into_iter().collect();

        store.save(&notes).await.unwrap();
        assert_eq!(store.load(), notes);

        let raw: Value = serde_json::from_slice(&fs::read(store.store_file()).unwrap()).unwrap();
        let stored = &raw["data"]["notes"];
        assert_eq!(stored.as_object().unwrap().len(), 1);
        let (_, record) = stored.as_object().unwrap().iter().next().unwrap();
        assert!(record["createdAt"].is_i64());
        assert_eq!(record["isBookmarked"], json!(true));
    }

    #[test]
    fn test_missing_store_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(gateway(&dir).load().is_empty());
        assert!(gateway(&dir).load_locked_set().is_empty());
    }

    #[test]
    fn test_garbled_store_is_empty_and_preserved() {
        let dir = TempDir::new().unwrap();
        let store = gateway(&dir);
        fs::create_dir_all(store.store_file().parent().unwrap()).unwrap();
        fs::write(store.store_file(), "{\"data\": {\"notes\": ").unwrap();

        assert!(store.load().is_empty());
        assert_eq!(corrupt_copies(store.store_file().parent().unwrap()), 1);
    }

    #[test]
    fn test_repeated_loads_keep_one_copy_per_content() {
        let dir = TempDir::new().unwrap();
        let store = gateway(&dir);
        let store_dir = store.store_file().parent().unwrap().to_path_buf();
        fs::create_dir_all(&store_dir).unwrap();
        fs::write(store.store_file(), "not json").unwrap();

        for _ in 0..5 {
            assert!(store.load().is_empty());
        }
        assert_eq!(corrupt_copies(&store_dir), 1);

        fs::write(store.store_file(), "still not json").unwrap();
        assert!(store.load().is_empty());
        assert!(store.load().is_empty());
        assert_eq!(corrupt_copies(&store_dir), 2);
    }

    #[test]
    fn test_store_without_notes_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = gateway(&dir);
        fs::create_dir_all(store.store_file().parent().unwrap()).unwrap();
        fs::write(store.store_file(), r#"{"data": {}}"#).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = gateway(&dir);
        fs::create_dir_all(store.store_file().parent().unwrap()).unwrap();
        let raw = json!({
            "data": {"notes": {
                "good": {"id": "good", "title": "ok", "createdAt": 1000, "updatedAt": "2000"},
                "bad": 42
            }}
        });
        fs::write(store.store_file(), raw.to_string()).unwrap();

        let notes = store.load();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes["good"].updated_at.timestamp_millis(), 2000);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_store_byte_identical() {
        let dir = TempDir::new().unwrap();
        let store = gateway(&dir);
        let id = store.mutate(|repo| Ok(repo.create(None).id)).await.unwrap();
        let before = fs::read(store.store_file()).unwrap();

        let err = store
            .mutate(|repo| repo.delete("no-such-note"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(fs::read(store.store_file()).unwrap(), before);
        assert!(store.load().contains_key(&id));
    }

    #[tokio::test]
    async fn test_locked_set_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = gateway(&dir);
        fs::create_dir_all(store.locked_file().join("occupied")).unwrap();

        let err = store
            .mutate(|repo| Ok(repo.create(Some("kept")).id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);

        let notes = store.load();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes.values().next().unwrap().title, "kept");
    }

    #[tokio::test]
    async fn test_lock_toggle_flushes_both_stores() {
        let dir = TempDir::new().unwrap();
        let store = gateway(&dir);
        let id = store.mutate(|repo| Ok(repo.create(None).id)).await.unwrap();

        store
            .mutate(|repo| repo.toggle_flag(&id, NoteFlag::Locked))
            .await
            .unwrap();
        assert!(store.load()[&id].is_locked);
        assert!(store.load_locked_set().contains(&id));

        store.mutate(|repo| repo.delete(&id)).await.unwrap();
        assert!(store.load().is_empty());
        assert!(store.load_locked_set().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_repairs_locked_set() {
        let dir = TempDir::new().unwrap();
        let store = gateway(&dir);
        let mut note = Note::new(None);
        note.is_locked = true;
        let id = note.id.clone();
        store.save(&[(id.clone(), note)].into_iter().collect()).await.unwrap();
        fs::write(store.locked_file(), r#"{"stale": true}"#).unwrap();

        let repo = store.snapshot().await;
        assert!(repo.locked_set().contains(&id));
        let on_disk = store.load_locked_set();
        assert!(on_disk.contains(&id) && !on_disk.contains("stale"));
    }
}
