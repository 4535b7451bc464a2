//! Personal note-taking core
//!
//! Notes hold a rich-text document tree that round-trips losslessly through
//! memory, a JSON store keyed by note id, and zipped export bundles. This
//! library provides the document model, text extraction, the note
//! repository, the persistence gateway, the bundle codec and search.

mod assets;
mod auth;
mod bundle;
mod cli;
mod config;
mod document;
mod errors;
mod extract;
mod helper;
mod locked_set;
pub mod note;
mod notebook;
mod repository;
mod search;
mod state;
mod storage;
mod types;

// Re-export key components
pub use assets::*;
pub use auth::*;
pub use bundle::*;
pub use cli::*;
pub use config::*;
pub use document::*;
pub use errors::*;
pub use extract::*;
pub use helper::*;
pub use locked_set::*;
pub use note::*;
pub use notebook::*;
pub use repository::*;
pub use search::*;
pub use state::*;
pub use storage::*;
pub use types::*;
