//! Shared helpers, mostly label parsing and atomic file writes.
use std::{fs, path::Path};

use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::{NoteError, Result};

/// Current time truncated to whole milliseconds, the precision notes are
/// stored with.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

// Helper method for parsing labels
pub fn parse_labels(labels: Option<String>) -> Vec<String> {
    normalize_labels(
        labels
            .map(|l| l.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
    )
}

/// Trims labels, drops empty ones and removes duplicates keeping first
/// occurrence order.
pub fn normalize_labels(labels: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.trim().to_string();
        if !label.is_empty() && !seen.contains(&label) {
            seen.push(label);
        }
    }
    seen
}

/// Writes `value` as JSON to `path` through a temporary file in the same
/// directory, so readers only ever see the old or the new file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    write_bytes_atomic(path, &json)
}

pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        debug!("Creating parent directory: {}", dir.display());
        fs::create_dir_all(dir).map_err(|_| NoteError::DirectoryError {
            path: dir.to_path_buf(),
        })?;
    }

    let mut temp_file = NamedTempFile::new_in(dir)?;
    trace!("Writing {} bytes to temporary file", bytes.len());
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(path).map_err(|e| NoteError::Io(e.error))?;
    debug!("Atomically replaced {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_labels() {
        assert_eq!(
            parse_labels(Some(" work, home ,,work".to_string())),
            vec!["work".to_string(), "home".to_string()]
        );
        assert!(parse_labels(None).is_empty());
    }

    #[test]
    fn test_now_millis_has_no_sub_millisecond_part() {
        let now = now_millis();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_write_json_atomic_creates_parents_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_json_atomic(&path, &vec![1, 2, 3], false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1,2,3]");

        write_json_atomic(&path, &vec![4], false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[4]");

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
