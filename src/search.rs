//! Query, label and view filtering over notes.
use std::cmp::Ordering;

use log::debug;

use crate::Note;

/// Which partition of notes a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteView {
    /// Everything not archived
    #[default]
    Active,
    /// Bookmarked and not archived
    Bookmarked,
    Archived,
    All,
}

impl NoteView {
    pub fn from_name(name: &str) -> Option<NoteView> {
        match name.to_ascii_lowercase().as_str() {
            "active" => Some(NoteView::Active),
            "bookmarked" => Some(NoteView::Bookmarked),
            "archived" => Some(NoteView::Archived),
            "all" => Some(NoteView::All),
            _ => None,
        }
    }

    pub fn includes(&self, note: &Note) -> bool {
        match self {
            NoteView::Active => !note.is_archived,
            NoteView::Bookmarked => note.is_bookmarked && !note.is_archived,
            NoteView::Archived => note.is_archived,
            NoteView::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Updated,
    Created,
    Title,
}

impl SortKey {
    pub fn from_name(name: &str) -> Option<SortKey> {
        match name.to_ascii_lowercase().as_str() {
            "updated" => Some(SortKey::Updated),
            "created" => Some(SortKey::Created),
            "title" => Some(SortKey::Title),
            _ => None,
        }
    }
}

/// A combined text, label and view filter.
#[derive(Debug, Clone, Default)]
pub struct NoteQuery {
    pub query: Option<String>,
    pub label: Option<String>,
    pub view: NoteView,
}

impl NoteQuery {
    pub fn matches(&self, note: &Note) -> bool {
        let query = self.query.as_deref().unwrap_or("");
        let label = self.label.as_deref().unwrap_or("");
        self.view.includes(note)
            && (label.is_empty() || note.has_label(label))
            && matches_query(note, &query.to_lowercase())
    }

    pub fn apply(&self, notes: &[Note]) -> Vec<Note> {
        let result: Vec<Note> = notes.iter().filter(|n| self.matches(n)).cloned().collect();
        debug!("Query {:?} matched {} of {} notes", self, result.len(), notes.len());
        result
    }
}

/// `lowered` must already be lowercase.
fn matches_query(note: &Note, lowered: &str) -> bool {
    if lowered.is_empty() || note.title.to_lowercase().contains(lowered) {
        return true;
    }
    serde_json::to_string(&note.content)
        .map(|json| json.to_lowercase().contains(lowered))
        .unwrap_or(false)
}

/// Notes whose title or serialized content contains `query`, ignoring case.
///
/// Matching the serialized content means markup names (`"paragraph"`) and
/// attribute values match as well as visible text.
pub fn search(notes: &[Note], query: &str) -> Vec<Note> {
    let lowered = query.to_lowercase();
    notes
        .iter()
        .filter(|note| matches_query(note, &lowered))
        .cloned()
        .collect()
}

/// Notes carrying `label`. `None` or an empty label returns every note.
pub fn filter_by_label(notes: &[Note], label: Option<&str>) -> Vec<Note> {
    match label {
        Some(label) if !label.is_empty() => notes
            .iter()
            .filter(|note| note.has_label(label))
            .cloned()
            .collect(),
        _ => notes.to_vec(),
    }
}

/// Title-only match, used when suggesting notes to link to.
pub fn search_titles<'a>(notes: impl IntoIterator<Item = &'a Note>, fragment: &str) -> Vec<Note> {
    let lowered = fragment.to_lowercase();
    notes
        .into_iter()
        .filter(|note| note.title.to_lowercase().contains(&lowered))
        .cloned()
        .collect()
}

pub fn sort_notes(notes: &mut [Note], key: SortKey, descending: bool) {
    notes.sort_by(|a, b| {
        let ordering = match key {
            SortKey::Updated => a.updated_at.cmp(&b.updated_at),
            SortKey::Created => a.created_at.cmp(&b.created_at),
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        }
        .then_with(|| a.id.cmp(&b.id));
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

/// Distinct labels across `notes`, sorted.
pub fn label_index<'a>(notes: impl IntoIterator<Item = &'a Note>) -> Vec<String> {
    let mut labels: Vec<String> = notes
        .into_iter()
        .flat_map(|note| note.labels.iter().cloned())
        .collect();
    labels.sort_by(|a, b| match a.to_lowercase().cmp(&b.to_lowercase()) {
        Ordering::Equal => a.cmp(b),
        other => other,
    });
    labels.dedup();
    labels
}
