//! In-memory note repository.
//!
//! Owns the id → note map and the locked-set while a mutation is applied.
//! Nothing here touches the disk; the store gateway loads a repository,
//! hands it to a mutation and flushes the result.
use log::{debug, info};

use crate::{
    helper::normalize_labels, Document, LockedSet, MergeSummary, Note, NoteError,
    NoteFlag, NoteMap, Result,
};

#[derive(Debug, Clone, Default)]
pub struct NoteRepository {
    notes: NoteMap,
    locked: LockedSet,
}

impl NoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrates a repository, repairing the locked-set from the note flags.
    ///
    /// Returns the repository and the number of locked-set entries repaired.
    pub fn from_parts(notes: NoteMap, mut locked: LockedSet) -> (Self, usize) {
        let repaired = locked.reconcile(&notes);
        (NoteRepository { notes, locked }, repaired)
    }

    pub fn from_notes(notes: NoteMap) -> Self {
        let locked = LockedSet::from_notes(&notes);
        NoteRepository { notes, locked }
    }

    pub fn into_parts(self) -> (NoteMap, LockedSet) {
        (self.notes, self.locked)
    }

    pub fn notes(&self) -> &NoteMap {
        &self.notes
    }

    pub fn locked_set(&self) -> &LockedSet {
        &self.locked
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.get(id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Note> {
        self.notes.get_mut(id).ok_or_else(|| NoteError::NoteNotFound {
            id: id.to_string(),
        })
    }

    /// Creates and inserts a fresh note.
    pub fn create(&mut self, title: Option<&str>) -> Note {
        let note = Note::new(title);
        info!("Created note {}", note.id);
        self.notes.insert(note.id.clone(), note.clone());
        note
    }

    /// Replaces a note's content and, when `title` is not blank, its title.
    pub fn update_content(
        &mut self,
        id: &str,
        content: Document,
        title: Option<&str>,
    ) -> Result<Note> {
        let note = self.get_mut(id)?;
        if !content.is_valid() {
            debug!(
                "Note {} content has unrecognized node types {:?}; keeping them as-is",
                id,
                content.unknown_node_types()
            );
        }
        note.content = content;
        if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
            note.title = title.to_string();
        }
        note.touch();
        Ok(note.clone())
    }

    /// Flips one flag. Lock flips also update the locked-set; callers must
    /// have authorized them already.
    pub fn toggle_flag(&mut self, id: &str, flag: NoteFlag) -> Result<Note> {
        let note = self.get_mut(id)?;
        let value = match flag {
            NoteFlag::Bookmarked => {
                note.is_bookmarked = !note.is_bookmarked;
                note.is_bookmarked
            }
            NoteFlag::Archived => {
                note.is_archived = !note.is_archived;
                note.is_archived
            }
            NoteFlag::Locked => {
                note.is_locked = !note.is_locked;
                note.is_locked
            }
        };
        let note = note.clone();
        if flag == NoteFlag::Locked {
            self.locked.set(id, value);
        }
        debug!("Note {} {:?} is now {}", id, flag, value);
        Ok(note)
    }

    /// Removes a note and its locked-set entry.
    pub fn delete(&mut self, id: &str) -> Result<Note> {
        let note = self.notes.remove(id).ok_or_else(|| NoteError::NoteNotFound {
            id: id.to_string(),
        })?;
        self.locked.remove(id);
        info!("Deleted note {}", id);
        Ok(note)
    }

    pub fn set_labels(&mut self, id: &str, labels: Vec<String>) -> Result<Note> {
        let note = self.get_mut(id)?;
        note.labels = normalize_labels(labels);
        note.touch();
        Ok(note.clone())
    }

    pub fn add_labels(&mut self, id: &str, labels: Vec<String>) -> Result<Note> {
        let mut combined = self.get_mut(id)?.labels.clone();
        combined.extend(labels);
        self.set_labels(id, combined)
    }

    pub fn remove_labels(&mut self, id: &str, labels: &[String]) -> Result<Note> {
        let mut remaining = self.get_mut(id)?.labels.clone();
        remaining.retain(|label| !labels.iter().any(|r| r.trim() == label.as_str()));
        self.set_labels(id, remaining)
    }

    /// Records the editor cursor position without touching `updated_at`.
    pub fn set_cursor_position(&mut self, id: &str, position: i64) -> Result<()> {
        self.get_mut(id)?.last_cursor_position = position;
        Ok(())
    }

    /// All notes matching `predicate`, oldest update first.
    pub fn list(&self, predicate: Option<&dyn Fn(&Note) -> bool>) -> Vec<Note> {
        let mut notes: Vec<Note> = self
            .notes
            .values()
            .filter(|note| predicate.map_or(true, |p| p(note)))
            .cloned()
            .collect();
        notes.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));
        notes
    }

    /// Distinct labels across all notes, sorted.
    pub fn labels(&self) -> Vec<String> {
        crate::label_index(self.notes.values())
    }

    /// Overlays `imported` onto the repository; imported records win.
    pub fn merge(&mut self, imported: NoteMap) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for (id, mut note) in imported {
            if note.id != id {
                debug!("Imported note keyed {} carried id {:?}; using key", id, note.id);
                note.id = id.clone();
            }
            self.locked.set(&id, note.is_locked);
            if self.notes.insert(id, note).is_some() {
                summary.replaced += 1;
            } else {
                summary.added += 1;
            }
        }
        info!(
            "Merged notes: {} added, {} replaced",
            summary.added, summary.replaced
        );
        summary
    }

    /// Inserts a note as-is, replacing any note with the same id.
    pub fn insert(&mut self, note: Note) {
        self.locked.set(&note.id, note.is_locked);
        self.notes.insert(note.id.clone(), note);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{note::epoch_millis, ErrorKind};

    #[test]
    fn test_create_inserts_note() {
        let mut repo = NoteRepository::new();
        let note = repo.create(Some("Shopping"));
        assert_eq!(repo.get(&note.id), Some(&note));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_update_content_keeps_title_when_blank() {
        let mut repo = NoteRepository::new();
        let note = repo.create(Some("Original"));
        let before = note.updated_at;

        let doc = Document::from_plain_text("body");
        let updated = repo.update_content(&note.id, doc.clone(), Some("  ")).unwrap();
        assert_eq!(updated.title, "Original");
        assert_eq!(updated.content, doc);
        assert!(updated.updated_at >= before);
        assert_eq!(updated.created_at, note.created_at);

        let renamed = repo
            .update_content(&note.id, Document::empty(), Some("Renamed"))
            .unwrap();
        assert_eq!(renamed.title, "Renamed");

        let untitled = repo.update_content(&note.id, Document::empty(), None).unwrap();
        assert_eq!(untitled.title, "Renamed");
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let mut repo = NoteRepository::new();
        let err = repo
            .update_content("missing", Document::empty(), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_toggle_lock_tracks_locked_set() {
        let mut repo = NoteRepository::new();
        let note = repo.create(None);

        let locked = repo.toggle_flag(&note.id, NoteFlag::Locked).unwrap();
        assert!(locked.is_locked);
        assert!(repo.locked_set().contains(&note.id));

        let unlocked = repo.toggle_flag(&note.id, NoteFlag::Locked).unwrap();
        assert!(!unlocked.is_locked);
        assert!(repo.locked_set().is_empty());
    }

    #[test]
    fn test_flags_are_independent() {
        let mut repo = NoteRepository::new();
        let note = repo.create(None);
        repo.toggle_flag(&note.id, NoteFlag::Bookmarked).unwrap();
        repo.toggle_flag(&note.id, NoteFlag::Archived).unwrap();
        let all = repo.toggle_flag(&note.id, NoteFlag::Locked).unwrap();
        assert!(all.is_bookmarked && all.is_archived && all.is_locked);
        assert_eq!(all.updated_at, note.updated_at);
    }

    #[test]
    fn test_delete_removes_locked_entry() {
        let mut repo = NoteRepository::new();
        let note = repo.create(None);
        repo.toggle_flag(&note.id, NoteFlag::Locked).unwrap();

        repo.delete(&note.id).unwrap();
        assert!(repo.get(&note.id).is_none());
        assert!(!repo.locked_set().contains(&note.id));

        let err = repo.delete(&note.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_list_orders_by_updated_at() {
        let mut repo = NoteRepository::new();
        let mut ids = Vec::new();
        for (i, millis) in [3_000_i64, 1_000, 2_000].iter().enumerate() {
            let mut note = Note::new(Some(&format!("n{}", i)));
            note.updated_at = epoch_millis::from_millis(*millis);
            ids.push(note.id.clone());
            repo.insert(note);
        }

        let titles: Vec<_> = repo.list(None).into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["n1", "n2", "n0"]);

        let only_first = |note: &Note| note.title == "n0";
        let filtered = repo.list(Some(&only_first));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, ids[0]);
    }

    #[test]
    fn test_labels_edit_and_index() {
        let mut repo = NoteRepository::new();
        let a = repo.create(None);
        let b = repo.create(None);
        repo.set_labels(&a.id, vec!["work".into(), " home ".into(), "work".into()])
            .unwrap();
        repo.add_labels(&b.id, vec!["work".into(), "ideas".into()]).unwrap();
        assert_eq!(repo.get(&a.id).unwrap().labels, vec!["work", "home"]);
        assert_eq!(repo.labels(), vec!["home", "ideas", "work"]);

        repo.remove_labels(&a.id, &["home".to_string()]).unwrap();
        assert_eq!(repo.get(&a.id).unwrap().labels, vec!["work"]);
        assert_eq!(repo.labels(), vec!["ideas", "work"]);
    }

    #[test]
    fn test_from_parts_repairs_locked_set() {
        let mut note = Note::new(None);
        note.is_locked = true;
        let notes: NoteMap = [(note.id.clone(), note.clone())].into_iter().collect();

        let mut stale = LockedSet::new();
        stale.insert("gone");
        let (repo, repaired) = NoteRepository::from_parts(notes, stale);
        assert_eq!(repaired, 2);
        assert!(repo.locked_set().contains(&note.id));
        assert!(!repo.locked_set().contains("gone"));
    }

    #[test]
    fn test_merge_overlays_imported() {
        let mut repo = NoteRepository::new();
        let mut existing = Note::new(Some("old"));
        existing.id = "A".to_string();
        repo.insert(existing);

        let mut incoming = Note::new(Some("new"));
        incoming.id = "A".to_string();
        incoming.is_locked = true;
        let mut other = Note::new(Some("other"));
        other.id = "wrong".to_string();
        let imported: NoteMap = [("A".to_string(), incoming), ("B".to_string(), other)]
            .into_iter()
            .collect();

        let summary = repo.merge(imported);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.replaced, 1);
        assert_eq!(repo.get("A").unwrap().title, "new");
        assert_eq!(repo.get("B").unwrap().id, "B");
        assert!(repo.locked_set().contains("A"));
    }
}
