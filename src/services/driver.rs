use crate::core::config::Config;
use crate::core::io::Storage;
use crate::core::state::{DocumentMeta, GenerationState};
use crate::services::export::render_markdown;
use crate::services::generator::{GenerationSettings, ProgressEvent};
use crate::services::llm::GenerationClient;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

type LockMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Runs the load -> advance -> persist cycle for documents identified by id.
///
/// Steps on the same document are serialized; different documents run independently.
pub struct NovelDriver {
    client: Box<dyn GenerationClient>,
    settings: GenerationSettings,
    storage: Arc<dyn Storage>,
    novels_folder: String,
    sessions_folder: String,
    total_chapters: u32,
    parts_per_chapter: u32,
    locks: LockMap,
}

/// Holds one document's lock; its map entry goes away with the last holder.
struct DocumentLock<'a> {
    locks: &'a LockMap,
    id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl DocumentLock<'_> {
    async fn acquire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for DocumentLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here: nobody else holds or waits on it.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.id);
        }
    }
}

impl NovelDriver {
    pub fn new(
        config: &Config,
        client: Box<dyn GenerationClient>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            client,
            settings: config.generation_settings(),
            storage,
            novels_folder: config.novels_folder.clone(),
            sessions_folder: config.sessions_folder.clone(),
            total_chapters: config.novel.total_chapters,
            parts_per_chapter: config.novel.parts_per_chapter,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: &str) -> DocumentLock<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks.entry(id.to_string()).or_default().clone();
        DocumentLock {
            locks: &self.locks,
            id: id.to_string(),
            lock,
        }
    }

    fn session_path(&self, id: &str) -> String {
        path_in(&self.sessions_folder, &format!("{}.json", id))
    }

    pub fn artifact_path(&self, id: &str) -> String {
        path_in(&self.novels_folder, &format!("{}.json", id))
    }

    pub fn markdown_path(&self, id: &str) -> String {
        path_in(&self.novels_folder, &format!("{}.md", id))
    }

    /// Starts a new document, replacing any session stored under the same id.
    pub async fn create(&self, id: &str, meta: DocumentMeta) -> Result<GenerationState> {
        validate_id(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.acquire().await;

        if self.storage.exists(&self.session_path(id)).await? {
            info!("Replacing existing session '{}'", id);
        }

        let state = GenerationState::with_totals(meta, self.total_chapters, self.parts_per_chapter);
        state.validate()?;
        self.persist(id, &state).await?;
        info!(
            "Created novel '{}' as '{}' ({} chapters x {} parts)",
            state.meta().title,
            id,
            state.total_chapters(),
            state.total_parts_per_chapter()
        );
        Ok(state)
    }

    /// One polling step. Generation failures come back as an error event;
    /// `Err` is reserved for storage problems and inconsistent snapshots.
    pub async fn step(&self, id: &str) -> Result<ProgressEvent> {
        validate_id(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.acquire().await;

        let mut state = self.load_unlocked(id).await?;
        let event = state.advance(self.client.as_ref(), &self.settings).await;

        if event.produced_content() {
            self.persist(id, &state).await?;
        }
        debug!("Step on '{}' -> {:?}", id, event.percentage());
        Ok(event)
    }

    pub async fn load(&self, id: &str) -> Result<GenerationState> {
        validate_id(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.acquire().await;
        self.load_unlocked(id).await
    }

    async fn load_unlocked(&self, id: &str) -> Result<GenerationState> {
        let path = self.session_path(id);
        if !self.storage.exists(&path).await? {
            bail!("No session found for '{}'", id);
        }
        let content = self.storage.read_to_string(&path).await?;
        GenerationState::from_json(&content)
            .with_context(|| format!("Session '{}' is unusable", id))
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        self.storage.exists(&self.session_path(id)).await
    }

    /// Ids of every stored session, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .storage
            .list(&self.sessions_folder)
            .await?
            .iter()
            .filter_map(|entry| {
                let name = Path::new(entry).file_name()?.to_str()?;
                name.strip_suffix(".json").map(str::to_string)
            })
            .filter(|id| validate_id(id).is_ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// The session goes last: a saved cursor never points past the saved artifact.
    async fn persist(&self, id: &str, state: &GenerationState) -> Result<()> {
        self.storage
            .write(&self.artifact_path(id), state.to_json_pretty()?.as_bytes())
            .await
            .context("Failed to save novel")?;
        self.storage
            .write(&self.markdown_path(id), render_markdown(state).as_bytes())
            .await
            .context("Failed to export novel")?;
        self.storage
            .write(&self.session_path(id), state.to_json()?.as_bytes())
            .await
            .context("Failed to save session")?;
        Ok(())
    }
}

fn path_in(folder: &str, file: &str) -> String {
    Path::new(folder).join(file).to_string_lossy().to_string()
}

pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id.len() > 64
        || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("Invalid document id '{}': use 1-64 characters from [A-Za-z0-9_-]", id);
    }
    Ok(())
}

/// Derives a document id from a title; falls back to "novel" when nothing usable remains.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= 48 {
            break;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "novel".to_string()
    } else {
        slug
    }
}
