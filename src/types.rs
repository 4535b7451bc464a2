//! Shared data structures for the notebox application.
//!
//! Result aliases, operation summaries and the CLI command set.
use std::{collections::BTreeMap, path::PathBuf};

use clap::Subcommand;

use crate::{Note, NoteError};

/// A specialized Result type for notebox operations.
pub type Result<T> = std::result::Result<T, NoteError>;

/// Notes keyed by id. Ordered so stores and bundles serialize deterministically.
pub type NoteMap = BTreeMap<String, Note>;

/// The independent boolean flags of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteFlag {
    Bookmarked,
    Archived,
    Locked,
}

/// Counts produced by overlaying imported notes onto existing ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Notes whose id was not present before
    pub added: usize,
    /// Notes that replaced an existing record with the same id
    pub replaced: usize,
}

/// Summary of an import operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Number of note records found in the bundle
    pub imported: usize,
    pub added: usize,
    pub replaced: usize,
    /// Asset files written into asset storage
    pub assets: usize,
}

/// Summary of an export operation
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Where the archive was written
    pub path: PathBuf,
    /// Archive file name, derived from the export date
    pub file_name: String,
    pub note_count: usize,
    pub asset_count: usize,
}

/// Available subcommands for the notebox application
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    New {
        /// Title of the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// Plain-text content, one paragraph per line
        #[clap(short, long)]
        content: Option<String>,

        /// File holding a JSON document or plain text
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Labels to attach (comma-separated)
        #[clap(short, long)]
        labels: Option<String>,
    },

    /// Replace a note's content and optionally its title
    Edit {
        /// ID of the note to edit
        id: String,

        /// New title; blank titles are ignored
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// New plain-text content
        #[clap(short, long)]
        content: Option<String>,

        /// File holding a JSON document or plain text
        #[clap(short, long)]
        file: Option<PathBuf>,
    },

    /// View a note by ID
    Show {
        /// ID of the note to view
        id: String,

        /// Format output as raw JSON
        #[clap(short, long)]
        json: bool,
    },

    /// List notes with optional filtering
    List {
        /// Only notes carrying this label
        #[clap(short, long)]
        label: Option<String>,

        /// Only notes matching this text
        #[clap(short, long)]
        query: Option<String>,

        /// Which partition to show
        #[clap(short, long, value_parser = ["active", "bookmarked", "archived", "all"], default_value = "active")]
        view: String,

        /// Sort key
        #[clap(short, long, value_parser = ["updated", "created", "title"], default_value = "updated")]
        sort: String,

        /// Reverse the sort order
        #[clap(short, long)]
        descending: bool,

        /// Limit the number of notes returned (0 for all)
        #[clap(short = 'n', long, default_value_t = 0)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Search notes by title or content
    Search {
        /// Search query text
        query: String,

        /// Limit the number of search results (0 for all)
        #[clap(short = 'n', long, default_value_t = 0)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Suggest notes to link to by title
    Suggest {
        /// Title fragment
        fragment: String,
    },

    /// List every label in use
    Labels,

    /// Add or remove labels on a note
    Label {
        /// ID of the note to modify
        id: String,

        /// Labels to add (comma-separated)
        #[clap(short, long)]
        add: Option<String>,

        /// Labels to remove (comma-separated)
        #[clap(short, long)]
        remove: Option<String>,
    },

    /// Toggle the bookmark flag
    Bookmark { id: String },

    /// Toggle the archive flag
    Archive { id: String },

    /// Lock or unlock a note (requires authentication)
    Lock { id: String },

    /// Delete a note by ID
    Delete {
        /// ID of the note to delete
        id: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Store a file in asset storage and link it from a note
    Attach {
        /// ID of the note
        id: String,

        /// File to attach
        file: PathBuf,
    },

    /// Export all notes and assets as a zip bundle
    Export {
        /// Directory to write the bundle into (default uses config setting)
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge notes from a bundle (zip or data.json)
    Import {
        /// Path to the bundle
        source: PathBuf,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Set the theme preference
        #[clap(long, value_parser = ["auto", "light", "dark"])]
        theme: Option<String>,

        /// Forget the stored lock password
        #[clap(long)]
        reset_password: bool,
    },
}
