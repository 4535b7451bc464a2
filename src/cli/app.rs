//! CLI module for the notebox application
//!
//! Translates parsed commands into notebook calls and prints the results.
use std::{fs::read_to_string, path::PathBuf};

use console::{style, Term};
use log::debug;
use serde_json::Value;

use crate::{
    parse_labels, Authorizer, Commands, Document, DOC_TYPE, NewNote, NoStrongAuth, Note, NoteError,
    NoteQuery, NoteView, Notebook, Result, SecretPrompt, SortKey, ThemeMode,
};

/// Reads passwords from the terminal without echoing them.
pub struct TerminalPrompt {
    term: Term,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        TerminalPrompt {
            term: Term::stderr(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretPrompt for TerminalPrompt {
    fn ask(&self, message: &str) -> Option<String> {
        self.term.write_str(&format!("{}: ", message)).ok()?;
        self.term.read_secure_line().ok()
    }
}

/// CLI Application handler - processes CLI commands against a notebook
pub struct App {
    notebook: Notebook,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    pub fn new(notebook: Notebook, verbose: bool) -> Self {
        Self { notebook, verbose }
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::New {
                title,
                content,
                file,
                labels,
            } => self.handle_new(title, content, file, labels).await?,

            Commands::Edit {
                id,
                title,
                content,
                file,
            } => self.handle_edit(id, title, content, file).await?,

            Commands::Show { id, json } => self.handle_show(id, json)?,

            Commands::List {
                label,
                query,
                view,
                sort,
                descending,
                limit,
                json,
            } => {
                let query = NoteQuery {
                    query,
                    label,
                    view: NoteView::from_name(&view).unwrap_or_default(),
                };
                let key = SortKey::from_name(&sort).unwrap_or_default();
                let mut notes = self.notebook.query(&query, key, descending);
                if limit > 0 {
                    notes.truncate(limit);
                }
                self.display_notes(&notes, json)?;
            }

            Commands::Search { query, limit, json } => {
                let mut results = self.notebook.search(&query);
                if limit > 0 {
                    results.truncate(limit);
                }
                if results.is_empty() && !json {
                    println!("No notes found matching query: \"{}\"", query);
                } else {
                    self.display_notes(&results, json)?;
                }
            }

            Commands::Suggest { fragment } => {
                for note in self.notebook.suggest_links(&fragment) {
                    println!("{}  {}", style(&note.id).dim(), note.title);
                }
            }

            Commands::Labels => {
                let labels = self.notebook.labels();
                if labels.is_empty() {
                    println!("No labels in use.");
                }
                for label in labels {
                    println!("{}", style(format!("#{}", label)).cyan());
                }
            }

            Commands::Label { id, add, remove } => {
                let note = self
                    .notebook
                    .edit_labels(&id, parse_labels(add), parse_labels(remove))
                    .await?;
                println!("Labels for '{}': {}", note.title, format_labels(&note));
            }

            Commands::Bookmark { id } => {
                let note = self.notebook.toggle_bookmark(&id).await?;
                println!(
                    "Note '{}' is {}",
                    note.title,
                    if note.is_bookmarked { "bookmarked" } else { "no longer bookmarked" }
                );
            }

            Commands::Archive { id } => {
                let note = self.notebook.toggle_archive(&id).await?;
                println!(
                    "Note '{}' is {}",
                    note.title,
                    if note.is_archived { "archived" } else { "restored from the archive" }
                );
            }

            Commands::Lock { id } => {
                self.notebook.get(&id)?;
                let prompt = TerminalPrompt::new();
                let authorizer = Authorizer::new(&NoStrongAuth, &prompt);
                let authorization = self.notebook.authorize_lock(&authorizer, &id)?;
                let note = self.notebook.toggle_lock(&id, &authorization).await?;
                println!(
                    "Note '{}' is {}",
                    note.title,
                    if note.is_locked { "locked" } else { "unlocked" }
                );
            }

            Commands::Delete { id, force } => self.handle_delete(id, force).await?,

            Commands::Attach { id, file } => {
                let note = self.notebook.attach_file(&id, &file).await?;
                println!("Attached {} to '{}'", file.display(), note.title);
            }

            Commands::Export { output } => {
                let summary = self.notebook.export(output.as_deref()).await?;
                println!(
                    "Exported {} notes and {} assets to {}",
                    summary.note_count,
                    summary.asset_count,
                    style(summary.path.display()).green()
                );
            }

            Commands::Import { source } => {
                let summary = self.notebook.import(&source).await?;
                println!(
                    "Imported {} notes ({} new, {} replaced) and {} assets",
                    summary.imported, summary.added, summary.replaced, summary.assets
                );
            }

            Commands::Config {
                show,
                theme,
                reset_password,
            } => self.handle_config(show, theme, reset_password)?,
        }

        Ok(())
    }

    async fn handle_new(
        &self,
        title: Option<String>,
        content: Option<String>,
        file: Option<PathBuf>,
        labels: Option<String>,
    ) -> Result<()> {
        let content = read_content(content, file)?;
        let note = self
            .notebook
            .create_note(NewNote {
                title,
                content,
                labels: parse_labels(labels),
            })
            .await?;
        println!("Note created with ID: {}", note.id);
        Ok(())
    }

    async fn handle_edit(
        &self,
        id: String,
        title: Option<String>,
        content: Option<String>,
        file: Option<PathBuf>,
    ) -> Result<()> {
        let note = match (read_content(content, file)?, title) {
            (Some(document), title) => {
                self.notebook
                    .update_note(&id, document, title.as_deref())
                    .await?
            }
            (None, Some(title)) => self.notebook.rename_note(&id, &title).await?,
            (None, None) => {
                return Err(NoteError::invalid_format(
                    "nothing to change: pass --title, --content or --file",
                ))
            }
        };
        println!("Note '{}' updated", note.title);
        Ok(())
    }

    fn handle_show(&self, id: String, json: bool) -> Result<()> {
        let note = self.notebook.get(&id)?;
        let authorization = if note.is_locked {
            let prompt = TerminalPrompt::new();
            let authorizer = Authorizer::new(&NoStrongAuth, &prompt);
            Some(self.notebook.authorize_unlock(&authorizer, &id)?)
        } else {
            None
        };
        let note = self.notebook.open_note(&id, authorization.as_ref())?;

        if json {
            println!("{}", serde_json::to_string_pretty(&note)?);
            return Ok(());
        }

        self.print_header(&note);
        println!("\n{}", note.plain_text());
        Ok(())
    }

    async fn handle_delete(&self, id: String, force: bool) -> Result<()> {
        let note = self.notebook.get(&id)?;

        if !force {
            println!("You are about to delete the following note:");
            self.print_header(&note);
            println!("\nThis action cannot be undone!");
            let term = Term::stdout();
            term.write_str("Are you sure you want to delete this note? [y/N]: ")?;
            let input = term.read_line()?;
            let input = input.trim().to_lowercase();
            if input != "y" && input != "yes" {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        let note = self.notebook.delete_note(&id).await?;
        println!(
            "Note '{}' ({}) has been permanently deleted.",
            note.title, note.id
        );
        Ok(())
    }

    fn handle_config(&self, show: bool, theme: Option<String>, reset_password: bool) -> Result<()> {
        if let Some(theme) = theme {
            let mode = ThemeMode::from_name(&theme)
                .ok_or_else(|| NoteError::invalid_format(format!("unknown theme: {}", theme)))?;
            self.notebook.set_theme(mode)?;
            println!("Theme set to {}", theme);
        }

        if reset_password {
            self.notebook.reset_password()?;
            println!("Lock password cleared; the next lock will ask for a new one.");
        }

        if show || self.verbose {
            println!("{}", serde_json::to_string_pretty(self.notebook.config())?);
            println!("theme: {:?}", self.notebook.state().theme_mode);
        }
        Ok(())
    }

    fn display_notes(&self, notes: &[Note], json: bool) -> Result<()> {
        if json {
            let simplified: Vec<Value> = notes
                .iter()
                .map(|note| {
                    serde_json::json!({
                        "id": note.id,
                        "title": note.title,
                        "labels": note.labels,
                        "createdAt": note.created_at.timestamp_millis(),
                        "updatedAt": note.updated_at.timestamp_millis(),
                        "isBookmarked": note.is_bookmarked,
                        "isArchived": note.is_archived,
                        "isLocked": note.is_locked,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&simplified)?);
            return Ok(());
        }

        if notes.is_empty() {
            println!("No notes found matching the criteria.");
            return Ok(());
        }

        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (i, note) in notes.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }
            self.print_header(note);
            if note.is_locked {
                println!("{}", style("[locked]").dim());
            } else {
                println!("{}", self.notebook.preview(note));
            }
        }

        println!(
            "\nFound {} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }

    fn print_header(&self, note: &Note) {
        let mut flags = Vec::new();
        if note.is_bookmarked {
            flags.push("bookmarked");
        }
        if note.is_archived {
            flags.push("archived");
        }
        if note.is_locked {
            flags.push("locked");
        }

        println!(
            "ID: {} | Updated: {}",
            note.id,
            note.updated_at.format("%Y-%m-%d %H:%M")
        );
        println!("Title: {}", style(&note.title).bold());
        if !note.labels.is_empty() {
            println!("Labels: {}", style(format_labels(note)).cyan());
        }
        if !flags.is_empty() {
            println!("{}", style(flags.join(", ")).yellow());
        }
    }
}

fn format_labels(note: &Note) -> String {
    note.labels
        .iter()
        .map(|label| format!("#{}", label))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content from `--content` text or a `--file` holding a JSON document or
/// plain text.
fn read_content(content: Option<String>, file: Option<PathBuf>) -> Result<Option<Document>> {
    match (content, file) {
        (Some(_), Some(_)) => Err(NoteError::invalid_format(
            "cannot specify both --content and --file",
        )),
        (Some(text), None) => Ok(Some(Document::from_plain_text(&text))),
        (None, Some(path)) => {
            let raw = read_to_string(&path)?;
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) if value.get("type").and_then(Value::as_str) == Some(DOC_TYPE) => {
                    debug!("Reading {} as a JSON document", path.display());
                    Ok(Some(Document::from_value(value)))
                }
                _ => Ok(Some(Document::from_plain_text(&raw))),
            }
        }
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_content_sources() {
        assert!(read_content(None, None).unwrap().is_none());
        assert!(read_content(Some("a".into()), Some("b".into())).is_err());

        let dir = TempDir::new().unwrap();
        let json = dir.path().join("doc.json");
        std::fs::write(&json, r#"{"type":"doc","content":[{"type":"horizontalRule"}]}"#).unwrap();
        let doc = read_content(None, Some(json)).unwrap().unwrap();
        assert_eq!(doc.blocks().unwrap().len(), 1);

        let text = dir.path().join("plain.txt");
        std::fs::write(&text, "one\ntwo").unwrap();
        let doc = read_content(None, Some(text)).unwrap().unwrap();
        assert_eq!(doc.blocks().unwrap().len(), 2);
    }
}
