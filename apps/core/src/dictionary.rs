use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::entry_store::{EntryStore, StoreError};
use crate::model::Entry;
use crate::settings::DictionarySettings;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

pub const CLOSE_DIALOG_DIRECTIVE: &str = "{:command:phrasefind_close_dialog}";
const SHOW_DIALOG_PREFIX: &str = "{:command:phrasefind_show_dialog:";

pub fn show_dialog_directive(path: &Path) -> String {
    let escaped = path
        .to_string_lossy()
        .replace('{', r"\{")
        .replace('}', r"\}");
    format!("{SHOW_DIALOG_PREFIX}{escaped}}}{{^}}")
}

// Missing the lock deadline means the caller already holds it further up
// its own call chain; it is never retried.
#[derive(Debug)]
pub struct Dictionary {
    path: PathBuf,
    store: Mutex<EntryStore>,
    lock_timeout: Duration,
}

impl Dictionary {
    pub fn create(path: impl Into<PathBuf>, settings: DictionarySettings) -> Self {
        Self::from_store(path, EntryStore::new(settings))
    }

    pub fn from_store(path: impl Into<PathBuf>, store: EntryStore) -> Self {
        Self {
            path: path.into(),
            store: Mutex::new(store),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<(Self, Vec<String>), StoreError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)?;
        let (store, warnings) = EntryStore::parse(&text)?;
        tracing::info!(
            path = %path.display(),
            entries = store.len(),
            dropped = warnings.len(),
            "dictionary loaded"
        );
        Ok((Self::from_store(path, store), warnings))
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn locked(&self) -> Result<MutexGuard<'_, EntryStore>, StoreError> {
        self.store
            .try_lock_for(self.lock_timeout)
            .ok_or(StoreError::LockTimeout(self.lock_timeout))
    }

    pub fn reload(&self) -> Result<Vec<String>, StoreError> {
        let mut store = self.locked()?;
        let text = std::fs::read_to_string(&self.path)?;
        let (loaded, warnings) = EntryStore::parse(&text)?;
        *store = loaded;
        Ok(warnings)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let store = self.locked()?;
        let rendered = store.render()?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        temp.write_all(rendered.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        tracing::debug!(path = %self.path.display(), entries = store.len(), "dictionary saved");
        Ok(())
    }

    pub fn add(&self, entry: Entry) -> Result<bool, StoreError> {
        Ok(self.locked()?.add(entry, true))
    }

    pub fn remove(&self, entry: &Entry) -> Result<(), StoreError> {
        self.locked()?.remove(entry)
    }

    pub fn edit(&self, old: &Entry, new: Entry) -> Result<bool, StoreError> {
        self.locked()?.edit(old, new)
    }

    pub fn search(&self, query: &str) -> Result<Vec<Entry>, StoreError> {
        Ok(self.locked()?.search(query))
    }

    pub fn lookup(&self, brief: &[String]) -> Result<Option<Entry>, StoreError> {
        Ok(self.locked()?.lookup(brief).cloned())
    }

    pub fn translate(
        &self,
        outline: &[String],
        dialog_showing: bool,
    ) -> Result<Option<String>, StoreError> {
        let store = self.locked()?;
        if store.is_reserved(outline) {
            return Ok(Some(show_dialog_directive(&self.path)));
        }

        let Some(entry) = store.lookup(outline) else {
            return Ok(None);
        };
        if dialog_showing && store.settings().pick_on_write {
            return Ok(Some(format!("{CLOSE_DIALOG_DIRECTIVE}{}", entry.translation)));
        }
        Ok(Some(entry.translation.clone()))
    }

    pub fn settings(&self) -> Result<DictionarySettings, StoreError> {
        Ok(self.locked()?.settings().clone())
    }

    pub fn longest_key(&self) -> Result<usize, StoreError> {
        Ok(self.locked()?.longest_key())
    }

    pub fn snapshot(&self) -> Result<EntryStore, StoreError> {
        Ok(self.locked()?.clone())
    }

    pub fn with_store<T>(&self, f: impl FnOnce(&EntryStore) -> T) -> Result<T, StoreError> {
        let store = self.locked()?;
        Ok(f(&store))
    }
}
