//! The notebook service: every command a UI layer issues, on top of the
//! store gateway and asset storage.
use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, info, warn};
use serde_json::Value;

use crate::{
    asset_path_string, export_bundle, read_bundle, save_note_asset, search, search_titles,
    sort_notes, AppState, AssetStorage, Authorization, Authorizer, Config, Document,
    ElementNode, ErrorKind, ExportSummary, FsAssetStorage, ImportSummary, Mark, Node, NodeKind, Note,
    NoteError, NoteFlag, NoteQuery, NoteRepository, Result, SortKey, StoreGateway, TextNode,
    ThemeMode, ZipCodec,
};

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg"];

/// Options for creating a note
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub title: Option<String>,
    pub content: Option<Document>,
    pub labels: Vec<String>,
}

/// The note-taking service: every command the UI layer issues.
///
/// Each mutating command is one fresh load, apply and save through the
/// store gateway's writer queue. The most recent repository is kept in
/// memory for reads.
pub struct Notebook {
    config: Config,
    gateway: StoreGateway,
    assets: Arc<dyn AssetStorage>,
    codec: ZipCodec,
    state: Mutex<AppState>,
    cache: Mutex<NoteRepository>,
}

impl Notebook {
    /// Opens the notebook described by `config` with on-disk asset storage.
    pub async fn open(config: Config) -> Result<Notebook> {
        let assets = Arc::new(FsAssetStorage::new(&config.assets_dir));
        Notebook::with_assets(config, assets).await
    }

    pub async fn with_assets(config: Config, assets: Arc<dyn AssetStorage>) -> Result<Notebook> {
        config.ensure_directories()?;
        let gateway = StoreGateway::new(&config);
        let state = AppState::load(&config.state_file);
        let repository = gateway.snapshot().await;
        info!(
            "Opened notebook at {} with {} notes",
            config.data_dir.display(),
            repository.len()
        );

        Ok(Notebook {
            config,
            gateway,
            assets,
            codec: ZipCodec,
            state: Mutex::new(state),
            cache: Mutex::new(repository),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> AppState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, NoteRepository> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a mutation through the gateway and refreshes the cache.
    ///
    /// A flush that fails part way may still have changed the note store, so
    /// the cache is reloaded from disk in that case.
    async fn apply<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut NoteRepository) -> Result<T>,
    {
        let result = self
            .gateway
            .mutate(|repo| {
                let value = f(repo)?;
                Ok((value, repo.clone()))
            })
            .await;

        match result {
            Ok((value, repository)) => {
                *self.lock_cache() = repository;
                Ok(value)
            }
            Err(e) => {
                if e.kind() == ErrorKind::IoFailure {
                    warn!("Mutation failed while saving, reloading notes: {}", e);
                    self.refresh().await;
                }
                Err(e)
            }
        }
    }

    /// Reloads the cache from disk.
    pub async fn refresh(&self) {
        let repository = self.gateway.snapshot().await;
        *self.lock_cache() = repository;
    }

    pub fn get(&self, id: &str) -> Result<Note> {
        self.lock_cache()
            .get(id)
            .cloned()
            .ok_or_else(|| NoteError::NoteNotFound { id: id.to_string() })
    }

    /// Every note, oldest update first.
    pub fn notes(&self) -> Vec<Note> {
        self.lock_cache().list(None)
    }

    pub fn labels(&self) -> Vec<String> {
        self.lock_cache().labels()
    }

    pub fn preview(&self, note: &Note) -> String {
        note.preview(self.config.preview_length)
    }

    pub fn query(&self, query: &NoteQuery, key: SortKey, descending: bool) -> Vec<Note> {
        let mut notes = query.apply(&self.notes());
        sort_notes(&mut notes, key, descending);
        notes
    }

    pub fn search(&self, query: &str) -> Vec<Note> {
        search(&self.notes(), query)
    }

    /// Notes whose titles contain `fragment`, for link suggestions.
    pub fn suggest_links(&self, fragment: &str) -> Vec<Note> {
        let cache = self.lock_cache();
        search_titles(cache.notes().values(), fragment)
    }

    pub async fn create_note(&self, new_note: NewNote) -> Result<Note> {
        self.apply(move |repo| {
            let note = repo.create(new_note.title.as_deref());
            let mut note = match new_note.content {
                Some(content) => repo.update_content(&note.id, content, None)?,
                None => note,
            };
            if !new_note.labels.is_empty() {
                note = repo.set_labels(&note.id, new_note.labels)?;
            }
            Ok(note)
        })
        .await
    }

    pub async fn update_note(
        &self,
        id: &str,
        content: Document,
        title: Option<&str>,
    ) -> Result<Note> {
        self.apply(|repo| repo.update_content(id, content, title)).await
    }

    pub async fn rename_note(&self, id: &str, title: &str) -> Result<Note> {
        self.apply(|repo| {
            let content = repo
                .get(id)
                .map(|note| note.content.clone())
                .ok_or_else(|| NoteError::NoteNotFound { id: id.to_string() })?;
            repo.update_content(id, content, Some(title))
        })
        .await
    }

    pub async fn toggle_bookmark(&self, id: &str) -> Result<Note> {
        self.apply(|repo| repo.toggle_flag(id, NoteFlag::Bookmarked))
            .await
    }

    pub async fn toggle_archive(&self, id: &str) -> Result<Note> {
        self.apply(|repo| repo.toggle_flag(id, NoteFlag::Archived))
            .await
    }

    /// Runs the lock-toggle authorization flow, saving a newly set password.
    pub fn authorize_lock(&self, authorizer: &Authorizer<'_>, id: &str) -> Result<Authorization> {
        let mut state = self.lock_state();
        let had_secret = state.has_shared_secret();
        let authorization = authorizer.authorize_toggle(&mut state, id)?;
        if !had_secret && state.has_shared_secret() {
            state.save(&self.config.state_file)?;
        }
        Ok(authorization)
    }

    pub fn authorize_unlock(&self, authorizer: &Authorizer<'_>, id: &str) -> Result<Authorization> {
        let state = self.lock_state();
        authorizer.authorize_unlock(&state, id)
    }

    pub async fn toggle_lock(&self, id: &str, authorization: &Authorization) -> Result<Note> {
        authorization.check(id)?;
        self.apply(|repo| repo.toggle_flag(id, NoteFlag::Locked)).await
    }

    /// Returns a note for display; locked notes need an authorization.
    pub fn open_note(&self, id: &str, authorization: Option<&Authorization>) -> Result<Note> {
        let note = self.get(id)?;
        if note.is_locked {
            authorization
                .ok_or_else(|| NoteError::auth(format!("note {} is locked", id)))?
                .check(id)?;
        }
        Ok(note)
    }

    pub async fn delete_note(&self, id: &str) -> Result<Note> {
        self.apply(|repo| repo.delete(id)).await
    }

    pub async fn set_labels(&self, id: &str, labels: Vec<String>) -> Result<Note> {
        self.apply(|repo| repo.set_labels(id, labels)).await
    }

    pub async fn edit_labels(&self, id: &str, add: Vec<String>, remove: Vec<String>) -> Result<Note> {
        self.apply(|repo| {
            repo.add_labels(id, add)?;
            repo.remove_labels(id, &remove)
        })
        .await
    }

    pub async fn set_cursor_position(&self, id: &str, position: i64) -> Result<()> {
        self.apply(|repo| repo.set_cursor_position(id, position)).await
    }

    /// Copies `file` into asset storage and appends a reference to it at the
    /// end of the note: an image block for pictures, a link otherwise.
    pub async fn attach_file(&self, id: &str, file: &Path) -> Result<Note> {
        let bytes = fs::read(file)?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let assets = Arc::clone(&self.assets);

        self.apply(move |repo| {
            let mut content = repo
                .get(id)
                .map(|note| note.content.clone())
                .ok_or_else(|| NoteError::NoteNotFound { id: id.to_string() })?;

            let stored = save_note_asset(assets.as_ref(), id, &file_name, &bytes)?;
            let src = asset_path_string(&stored);
            content.push_block(attachment_block(&file_name, &src));
            repo.update_content(id, content, None)
        })
        .await
    }

    /// Writes an export bundle into `output_dir`, or the configured export
    /// directory.
    pub async fn export(&self, output_dir: Option<&Path>) -> Result<ExportSummary> {
        let repository = self.gateway.snapshot().await;
        let dir = output_dir.unwrap_or(&self.config.export_dir);
        export_bundle(&self.codec, repository.notes(), self.assets.as_ref(), dir)
    }

    /// Merges a bundle file into the notebook. Imported notes replace
    /// existing ones with the same id; nothing is removed.
    pub async fn import(&self, source: &Path) -> Result<ImportSummary> {
        let bytes = fs::read(source)?;
        let bundle = read_bundle(&self.codec, &bytes)?;

        let imported = bundle.notes.len();
        let merge = self.apply(move |repo| Ok(repo.merge(bundle.notes))).await?;

        for (path, content) in &bundle.assets {
            self.assets.write_file(path, content)?;
        }

        let summary = ImportSummary {
            imported,
            added: merge.added,
            replaced: merge.replaced,
            assets: bundle.assets.len(),
        };
        info!("Imported {} notes from {}", imported, source.display());
        Ok(summary)
    }

    pub fn set_theme(&self, theme: ThemeMode) -> Result<()> {
        let mut state = self.lock_state();
        state.theme_mode = theme;
        state.save(&self.config.state_file)
    }

    pub fn reset_password(&self) -> Result<()> {
        let mut state = self.lock_state();
        state.shared_secret_hash = None;
        debug!("Cleared lock password");
        state.save(&self.config.state_file)
    }
}

fn attachment_block(file_name: &str, src: &str) -> Node {
    let is_image = Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));

    if is_image {
        Node::Element(
            ElementNode::new(NodeKind::Image)
                .with_attr("src", Value::String(src.to_string()))
                .with_attr("alt", Value::String(file_name.to_string())),
        )
    } else {
        let link = TextNode::new(file_name).with_mark(Mark::link(src));
        Node::Element(ElementNode::new(NodeKind::Paragraph).with_content(vec![Node::Text(link)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoStrongAuth, NoteView, SecretPrompt};
    use tempfile::TempDir;

    struct FixedPassword(&'static str);

    impl SecretPrompt for FixedPassword {
        fn ask(&self, _message: &str) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    async fn notebook(dir: &TempDir) -> Notebook {
        Notebook::open(Config::with_data_dir(dir.path())).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_with_content_and_labels() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir).await;
        let note = nb
            .create_note(NewNote {
                title: Some("Plan".to_string()),
                content: Some(Document::from_plain_text("step one")),
                labels: vec!["work".to_string(), "work".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(note.labels, vec!["work"]);
        assert_eq!(nb.preview(&note), "step one");
        assert_eq!(nb.get(&note.id).unwrap(), note);

        let reopened = notebook(&dir).await;
        assert_eq!(reopened.get(&note.id).unwrap(), note);
    }

    #[tokio::test]
    async fn test_lock_flow_requires_authorization() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir).await;
        let note = nb.create_note(NewNote::default()).await.unwrap();

        let prompt = FixedPassword("secret");
        let authorizer = Authorizer::new(&NoStrongAuth, &prompt);
        let auth = nb.authorize_lock(&authorizer, &note.id).unwrap();
        assert!(AppState::load(&nb.config().state_file).has_shared_secret());

        let locked = nb.toggle_lock(&note.id, &auth).await.unwrap();
        assert!(locked.is_locked);

        let err = nb.open_note(&note.id, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailure);
        let unlock = nb.authorize_unlock(&authorizer, &note.id).unwrap();
        assert!(nb.open_note(&note.id, Some(&unlock)).is_ok());

        let other = nb.create_note(NewNote::default()).await.unwrap();
        assert!(nb.toggle_lock(&other.id, &auth).await.is_err());
    }

    #[tokio::test]
    async fn test_attach_file_appends_block() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir).await;
        let note = nb.create_note(NewNote::default()).await.unwrap();

        let source = dir.path().join("photo.PNG");
        fs::write(&source, b"img").unwrap();
        let updated = nb.attach_file(&note.id, &source).await.unwrap();

        let blocks = updated.content.blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind(), Some(NodeKind::Image));
        let files = FsAssetStorage::new(&nb.config().assets_dir).list_files().unwrap();
        assert_eq!(files.len(), 1);

        let missing = nb.attach_file("nope", &source).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_failed_flush_reloads_cache_from_disk() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(dir.path());
        config.locked_notes_file = dir.path().join("locked-dir");
        fs::create_dir_all(config.locked_notes_file.join("occupied")).unwrap();
        let nb = Notebook::open(config).await.unwrap();

        let err = nb.create_note(NewNote::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(nb.notes().len(), 1);
        assert_eq!(nb.notes(), notebook(&dir).await.notes());
    }

    #[tokio::test]
    async fn test_import_merges_notes_and_writes_assets() {
        let source_dir = TempDir::new().unwrap();
        let source = notebook(&source_dir).await;
        let note = source.create_note(NewNote::default()).await.unwrap();
        let file = source_dir.path().join("photo.png");
        fs::write(&file, b"img").unwrap();
        source.attach_file(&note.id, &file).await.unwrap();
        let exported = source.export(None).await.unwrap();

        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir).await;
        let summary = nb.import(&exported.path).await.unwrap();
        assert_eq!((summary.imported, summary.added, summary.assets), (1, 1, 1));
        assert!(nb.get(&note.id).is_ok());

        let listed = |nb: &Notebook| FsAssetStorage::new(&nb.config().assets_dir).list_files().unwrap();
        assert_eq!(listed(&nb), listed(&source));
        assert_eq!(listed(&nb).len(), 1);
    }

    #[tokio::test]
    async fn test_query_views_and_labels() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir).await;
        let a = nb.create_note(NewNote::default()).await.unwrap();
        let b = nb.create_note(NewNote::default()).await.unwrap();
        nb.toggle_archive(&a.id).await.unwrap();
        nb.edit_labels(&b.id, vec!["x".into(), "y".into()], vec!["x".into()])
            .await
            .unwrap();

        let active = nb.query(&NoteQuery::default(), SortKey::Updated, false);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
        assert_eq!(nb.labels(), vec!["y"]);

        let archived = NoteQuery {
            view: NoteView::Archived,
            ..Default::default()
        };
        assert_eq!(nb.query(&archived, SortKey::Title, true)[0].id, a.id);
    }
}
