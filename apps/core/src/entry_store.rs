use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{Entry, Outline};
use crate::settings::{self, DictionarySettings};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store lock not acquired within {0:?} (reentrant access?)")]
    LockTimeout(std::time::Duration),
    #[error("store invariant violated: {0}")]
    Inconsistent(String),
    #[error("unsupported dictionary version {0} (expected {FORMAT_VERSION})")]
    UnsupportedVersion(u32),
    #[error("invalid dictionary settings: {0}")]
    InvalidSettings(String),
    #[error("failed to parse dictionary: {0}")]
    Parse(String),
    #[error("failed to encode dictionary: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("dictionary io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LockTimeout(_) | Self::Inconsistent(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryFile {
    #[serde(default = "legacy_version")]
    pub version: u32,
    pub search_stroke: String,
    #[serde(default)]
    pub accept_stroke: String,
    #[serde(default)]
    pub pick_on_write: bool,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

fn legacy_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryStore {
    settings: DictionarySettings,
    entries: Vec<Entry>,
    by_brief: HashMap<Outline, Entry>,
    longest_key: usize,
}

impl EntryStore {
    pub fn new(settings: DictionarySettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &DictionarySettings {
        &self.settings
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn longest_key(&self) -> usize {
        self.longest_key
    }

    pub fn lookup(&self, brief: &[String]) -> Option<&Entry> {
        self.by_brief.get(brief)
    }

    pub fn is_reserved(&self, brief: &[String]) -> bool {
        brief.len() == 1 && brief[0] == self.settings.search_stroke
    }

    pub fn add(&mut self, entry: Entry, check_duplicate: bool) -> bool {
        self.insert(entry, check_duplicate).is_ok()
    }

    fn insert(&mut self, entry: Entry, check_duplicate: bool) -> Result<(), Entry> {
        if entry.has_brief() {
            if self.is_reserved(&entry.brief) || self.by_brief.contains_key(&entry.brief) {
                return Err(entry);
            }
            self.longest_key = self.longest_key.max(entry.brief.len());
            self.by_brief.insert(entry.brief.clone(), entry.clone());
        } else if check_duplicate && self.entries.contains(&entry) {
            return Err(entry);
        }

        self.entries.push(entry);
        Ok(())
    }

    pub fn remove(&mut self, entry: &Entry) -> Result<(), StoreError> {
        let matches = self.entries.iter().filter(|e| *e == entry).count();
        if matches != 1 {
            return Err(StoreError::Inconsistent(format!(
                "expected exactly one {entry} to remove, found {matches}"
            )));
        }
        if entry.has_brief() && self.by_brief.get(&entry.brief) != Some(entry) {
            return Err(StoreError::Inconsistent(format!(
                "brief index does not map {entry}"
            )));
        }

        if entry.has_brief() {
            self.by_brief.remove(&entry.brief);
            if entry.brief.len() == self.longest_key {
                self.longest_key = self.longest_brief_len();
            }
        }
        self.entries.retain(|e| e != entry);
        Ok(())
    }

    pub fn edit(&mut self, old: &Entry, new: Entry) -> Result<bool, StoreError> {
        let Some(position) = self.entries.iter().position(|e| e == old) else {
            return Err(StoreError::Inconsistent(format!("{old} is not in the store")));
        };
        if *old == new {
            return Ok(true);
        }
        if old.has_brief() && self.by_brief.get(&old.brief) != Some(old) {
            return Err(StoreError::Inconsistent(format!(
                "brief index does not map {old}"
            )));
        }

        let taken_elsewhere = self
            .entries
            .iter()
            .enumerate()
            .any(|(index, e)| index != position && *e == new);
        if taken_elsewhere {
            return Ok(false);
        }
        if new.has_brief() {
            if self.is_reserved(&new.brief) {
                return Ok(false);
            }
            if self
                .by_brief
                .get(&new.brief)
                .is_some_and(|existing| existing != old)
            {
                return Ok(false);
            }
        }

        let old_len = old.brief.len();
        let new_len = new.brief.len();
        if old.has_brief() {
            self.by_brief.remove(&old.brief);
        }
        if new.has_brief() {
            self.by_brief.insert(new.brief.clone(), new.clone());
        }
        self.entries[position] = new;

        if new_len > self.longest_key {
            self.longest_key = new_len;
        } else if old_len == self.longest_key && new_len < old_len {
            self.longest_key = self.longest_brief_len();
        }
        Ok(true)
    }

    pub fn search(&self, query: &str) -> Vec<Entry> {
        crate::search::rank(query, &self.entries)
    }

    fn longest_brief_len(&self) -> usize {
        self.by_brief.keys().map(Vec::len).max().unwrap_or(0)
    }

    pub fn from_file(file: DictionaryFile) -> Result<(Self, Vec<String>), StoreError> {
        if file.version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(file.version));
        }

        let settings = DictionarySettings {
            search_stroke: file.search_stroke,
            accept_stroke: file.accept_stroke,
            pick_on_write: file.pick_on_write,
        };
        settings::validate(&settings).map_err(StoreError::InvalidSettings)?;

        let mut store = Self::new(settings);
        let mut warnings = Vec::new();
        for entry in file.entries {
            if let Err(rejected) = store.insert(entry, true) {
                let warning = format!("dropped duplicate entry {rejected}");
                tracing::warn!("{warning}");
                warnings.push(warning);
            }
        }
        Ok((store, warnings))
    }

    pub fn to_file(&self) -> DictionaryFile {
        DictionaryFile {
            version: FORMAT_VERSION,
            search_stroke: self.settings.search_stroke.clone(),
            accept_stroke: self.settings.accept_stroke.clone(),
            pick_on_write: self.settings.pick_on_write,
            entries: self.entries.clone(),
        }
    }

    pub fn parse(text: &str) -> Result<(Self, Vec<String>), StoreError> {
        let file: DictionaryFile =
            json5::from_str(text).map_err(|e| StoreError::Parse(e.to_string()))?;
        Self::from_file(file)
    }

    pub fn render(&self) -> Result<String, StoreError> {
        let mut out = String::from("{\n");
        out.push_str(&format!("\"version\": {FORMAT_VERSION},\n"));
        out.push_str(&format!(
            "\"search_stroke\": {},\n",
            serde_json::to_string(&self.settings.search_stroke)?
        ));
        out.push_str(&format!(
            "\"accept_stroke\": {},\n",
            serde_json::to_string(&self.settings.accept_stroke)?
        ));
        out.push_str(&format!(
            "\"pick_on_write\": {},\n",
            self.settings.pick_on_write
        ));
        out.push_str("\"entries\": [\n");
        let lines = self
            .entries
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        if !lines.is_empty() {
            out.push_str(&lines.join(",\n"));
            out.push('\n');
        }
        out.push_str("]\n}\n");
        Ok(out)
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        let with_brief: Vec<&Entry> = self.entries.iter().filter(|e| e.has_brief()).collect();
        if with_brief.len() != self.by_brief.len() {
            return Err(format!(
                "{} entries have a brief but the index holds {}",
                with_brief.len(),
                self.by_brief.len()
            ));
        }
        for entry in with_brief {
            if self.by_brief.get(&entry.brief) != Some(entry) {
                return Err(format!("index does not map {entry}"));
            }
        }
        let expected = self.longest_brief_len();
        if expected != self.longest_key {
            return Err(format!(
                "cached longest key {} but longest brief is {expected}",
                self.longest_key
            ));
        }
        Ok(())
    }
}
