use std::sync::Arc;

use parking_lot::Mutex;

use crate::channel::ChannelError;
use crate::entry_store::{EntryStore, StoreError};
use crate::model::{outline_to_text, text_to_outline, Entry, Outline};
use crate::transport::{ErrorCode, ErrorResponse};

pub const PLACEHOLDER: &str = "[...]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogState {
    Closed,
    Open,
    ProgrammaticEdit,
    Editing { entry: Entry, row: usize },
}

impl DialogState {
    fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::ProgrammaticEdit => "programmatic edit",
            Self::Editing { .. } => "editing",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("illegal transition: {action} while {state}")]
    IllegalTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("finish or cancel the edit before picking")]
    PickWhileEditing,
    #[error("there is no entry to act on")]
    EmptyTable,
    #[error("translation and description are both required")]
    MissingFields,
    #[error("{0} conflicts with an existing entry")]
    Rejected(Entry),
    #[error("host link failed: {0}")]
    Link(#[from] ChannelError),
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IllegalTransition { .. } | Self::Link(_))
    }
}

pub trait HostLink: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<Entry>, ChannelError>;
    fn lookup(&self, brief: &[String]) -> Result<Option<String>, ChannelError>;
    fn add_translation(&self, entry: &Entry) -> Result<bool, ChannelError>;
    fn edit_translation(&self, old: &Entry, new: &Entry) -> Result<bool, ChannelError>;
    fn remove_translation(&self, entry: &Entry) -> Result<(), ChannelError>;
    fn picked(&self, entry: Option<&Entry>) -> Result<(), ChannelError>;
    fn show_error(&self, message: &str) -> Result<(), ChannelError>;
}

pub trait DialogView: Send {
    fn show(&mut self);
    fn hide(&mut self);
    fn rows_changed(&mut self, rows: &[Entry], selected: Option<usize>);
    fn form_changed(&mut self, form: &FormFields);
    fn set_brief_feedback(&mut self, message: &str);
    fn show_message(&mut self, message: &str);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    pub translation: String,
    pub description: String,
    pub brief: String,
}

impl FormFields {
    fn from_entry(entry: &Entry) -> Self {
        Self {
            translation: entry.translation.clone(),
            description: entry.description.clone(),
            brief: outline_to_text(&entry.brief),
        }
    }

    fn to_entry(&self) -> Option<Entry> {
        let translation = self.translation.trim();
        let description = self.description.trim();
        if translation.is_empty() || description.is_empty() {
            return None;
        }
        Some(Entry::from_owned(
            translation.to_string(),
            description.to_string(),
            text_to_outline(&self.brief),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub epoch: u64,
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Applied,
    Discarded,
}

pub fn placeholder_entry() -> Entry {
    Entry::new(PLACEHOLDER, PLACEHOLDER, &[PLACEHOLDER])
}

pub struct DialogSession<V: DialogView> {
    link: Arc<dyn HostLink>,
    view: V,
    state: DialogState,
    rows: Vec<Entry>,
    selected: Option<usize>,
    form: FormFields,
    epoch: u64,
}

impl<V: DialogView> DialogSession<V> {
    pub fn new(link: Arc<dyn HostLink>, view: V) -> Self {
        Self {
            link,
            view,
            state: DialogState::Closed,
            rows: Vec::new(),
            selected: None,
            form: FormFields::default(),
            epoch: 0,
        }
    }

    pub fn state(&self) -> &DialogState {
        &self.state
    }

    pub fn rows(&self) -> &[Entry] {
        &self.rows
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn form(&self) -> &FormFields {
        &self.form
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn is_open(&self) -> bool {
        self.state != DialogState::Closed
    }

    fn illegal(&self, action: &'static str) -> SessionError {
        SessionError::IllegalTransition {
            action,
            state: self.state.name(),
        }
    }

    pub fn open(&mut self) -> Result<SearchTicket, SessionError> {
        if self.state != DialogState::Closed {
            return Err(self.illegal("open"));
        }
        self.state = DialogState::Open;
        self.epoch += 1;
        self.form = FormFields::default();
        self.rows.clear();
        self.selected = None;
        self.view.form_changed(&self.form);
        self.view.rows_changed(&self.rows, self.selected);
        self.view.show();
        tracing::info!(epoch = self.epoch, "dialog opened");
        Ok(self.ticket())
    }

    pub fn close(&mut self) -> Result<(), SessionError> {
        match std::mem::replace(&mut self.state, DialogState::Closed) {
            DialogState::Open => {}
            DialogState::Editing { entry, row } => {
                tracing::debug!(%entry, "edit abandoned by close");
                self.put_row(row, entry);
            }
            other => {
                self.state = other;
                return Err(self.illegal("close"));
            }
        }
        self.epoch += 1;
        self.view.hide();
        tracing::info!("dialog closed");
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, DialogState::Open | DialogState::Editing { .. }) {
            return Err(self.illegal("cancel"));
        }
        self.link.picked(None)?;
        self.close()
    }

    pub fn pick(&mut self) -> Result<Entry, SessionError> {
        match self.state {
            DialogState::Open => {}
            DialogState::Editing { .. } => return Err(SessionError::PickWhileEditing),
            _ => return Err(self.illegal("pick")),
        }
        let row = self.target_row()?;
        let entry = self.rows[row].clone();
        self.link.picked(Some(&entry))?;
        self.close()?;
        Ok(entry)
    }

    pub fn start_edit(&mut self) -> Result<(), SessionError> {
        if self.state != DialogState::Open {
            return Err(self.illegal("start edit"));
        }
        let row = self.target_row()?;
        let entry = std::mem::replace(&mut self.rows[row], placeholder_entry());
        self.form = FormFields::from_entry(&entry);
        tracing::debug!(%entry, row, "editing");
        self.state = DialogState::Editing { entry, row };
        self.view.rows_changed(&self.rows, self.selected);
        self.view.form_changed(&self.form);
        Ok(())
    }

    pub fn submit(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, DialogState::Open | DialogState::Editing { .. }) {
            return Err(self.illegal("submit"));
        }
        let Some(new) = self.form.to_entry() else {
            return Err(SessionError::MissingFields);
        };

        match std::mem::replace(&mut self.state, DialogState::Open) {
            DialogState::Editing { entry: old, row } => self.resubmit(old, row, new),
            _ => self.add_new(new),
        }
    }

    fn add_new(&mut self, entry: Entry) -> Result<(), SessionError> {
        self.rows.insert(0, entry.clone());
        self.selected = Some(0);
        if !self.link.add_translation(&entry)? {
            self.rows.remove(0);
            self.selected = None;
            self.view.rows_changed(&self.rows, self.selected);
            return Err(SessionError::Rejected(entry));
        }
        self.form = FormFields::default();
        self.view.rows_changed(&self.rows, self.selected);
        self.view.form_changed(&self.form);
        Ok(())
    }

    fn resubmit(&mut self, old: Entry, row: usize, new: Entry) -> Result<(), SessionError> {
        if old == new {
            self.put_row(row, old);
            self.form = FormFields::default();
            self.view.form_changed(&self.form);
            return Ok(());
        }

        self.link.remove_translation(&old)?;
        if self.link.add_translation(&new)? {
            self.put_row(row, new);
            self.form = FormFields::default();
            self.view.form_changed(&self.form);
            return Ok(());
        }

        // The old entry was already removed on the host; put it back.
        if !self.link.add_translation(&old)? {
            tracing::error!(%old, "could not restore entry after rejected edit");
        }
        self.put_row(row, old);
        Err(SessionError::Rejected(new))
    }

    pub fn delete(&mut self) -> Result<Entry, SessionError> {
        match std::mem::replace(&mut self.state, DialogState::Open) {
            DialogState::Editing { entry, row } => {
                self.link.remove_translation(&entry)?;
                self.remove_row(row);
                self.form = FormFields::default();
                self.view.form_changed(&self.form);
                Ok(entry)
            }
            DialogState::Open => {
                let row = self.target_row()?;
                let entry = self.rows[row].clone();
                self.link.remove_translation(&entry)?;
                self.remove_row(row);
                Ok(entry)
            }
            other => {
                self.state = other;
                Err(self.illegal("delete"))
            }
        }
    }

    pub fn begin_programmatic_edit(&mut self) -> Result<(), SessionError> {
        if self.state != DialogState::Open {
            return Err(self.illegal("begin programmatic edit"));
        }
        self.state = DialogState::ProgrammaticEdit;
        Ok(())
    }

    pub fn end_programmatic_edit(&mut self) -> Result<(), SessionError> {
        if self.state != DialogState::ProgrammaticEdit {
            return Err(self.illegal("end programmatic edit"));
        }
        self.state = DialogState::Open;
        Ok(())
    }

    pub fn set_description_text(&mut self, text: &str) -> Result<(), SessionError> {
        self.begin_programmatic_edit()?;
        let ignored = self.description_changed(text);
        debug_assert!(ignored.is_none());
        self.view.form_changed(&self.form);
        self.end_programmatic_edit()
    }

    pub fn description_changed(&mut self, text: &str) -> Option<SearchTicket> {
        self.form.description = text.to_string();
        match self.state {
            DialogState::Open => Some(self.ticket()),
            _ => None,
        }
    }

    pub fn translation_changed(&mut self, text: &str) {
        self.form.translation = text.to_string();
    }

    pub fn brief_changed(&mut self, text: &str) -> Result<(), SessionError> {
        self.form.brief = text.to_string();
        let outline = text_to_outline(text);
        if outline.is_empty() {
            self.view.set_brief_feedback("");
            return Ok(());
        }

        let shown = outline_to_text(&outline);
        let feedback = match self.link.lookup(&outline)? {
            Some(translation) => format!("{shown} maps to {translation}"),
            None => format!("{shown} is not mapped in any dictionary"),
        };
        self.view.set_brief_feedback(&feedback);
        Ok(())
    }

    // Results and failures of an earlier session's search are both dropped.
    pub fn apply_search_results(
        &mut self,
        ticket: &SearchTicket,
        results: Result<Vec<Entry>, ChannelError>,
    ) -> Result<SearchOutcome, SessionError> {
        if ticket.epoch != self.epoch || !self.is_open() {
            if let Err(error) = &results {
                tracing::debug!(query = %ticket.query, "stale search failed: {error}");
            } else {
                tracing::debug!(query = %ticket.query, "stale search results discarded");
            }
            return Ok(SearchOutcome::Discarded);
        }
        let rows = results?;
        if self.state != DialogState::Open {
            tracing::debug!(query = %ticket.query, "table is held by an edit");
            return Ok(SearchOutcome::Discarded);
        }
        self.rows = rows;
        self.selected = None;
        self.view.rows_changed(&self.rows, self.selected);
        Ok(SearchOutcome::Applied)
    }

    pub fn select_row(&mut self, row: usize) -> bool {
        if row >= self.rows.len() {
            return false;
        }
        self.selected = Some(row);
        self.view.rows_changed(&self.rows, self.selected);
        true
    }

    pub fn tear_down(&mut self) {
        let was_open = self.is_open();
        self.state = DialogState::Closed;
        self.epoch += 1;
        self.rows.clear();
        self.selected = None;
        self.form = FormFields::default();
        if was_open {
            self.view.hide();
        }
        tracing::warn!("dialog session torn down");
    }

    fn ticket(&self) -> SearchTicket {
        SearchTicket {
            epoch: self.epoch,
            query: self.form.description.clone(),
        }
    }

    fn target_row(&self) -> Result<usize, SessionError> {
        if self.rows.is_empty() {
            return Err(SessionError::EmptyTable);
        }
        Ok(self.selected.filter(|row| *row < self.rows.len()).unwrap_or(0))
    }

    fn put_row(&mut self, row: usize, entry: Entry) {
        match self.rows.get_mut(row) {
            Some(slot) => *slot = entry,
            None => self.rows.push(entry),
        }
        self.view.rows_changed(&self.rows, self.selected);
    }

    fn remove_row(&mut self, row: usize) {
        if row < self.rows.len() {
            self.rows.remove(row);
        }
        self.selected = match self.selected {
            Some(selected) if selected >= self.rows.len() => None,
            other => other,
        };
        self.view.rows_changed(&self.rows, self.selected);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    Search(String),
    Lookup(Outline),
    Add(Entry),
    Edit(Entry, Entry),
    Remove(Entry),
    Picked(Option<Entry>),
    ShowError(String),
}

#[derive(Default)]
pub struct MockHostLink {
    store: Mutex<EntryStore>,
    calls: Mutex<Vec<LinkCall>>,
}

impl MockHostLink {
    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let mut store = EntryStore::default();
        for entry in entries {
            store.add(entry, true);
        }
        Self {
            store: Mutex::new(store),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.store.lock().entries().to_vec()
    }

    fn record(&self, call: LinkCall) {
        self.calls.lock().push(call);
    }
}

fn remote_failure(name: &str, error: StoreError) -> ChannelError {
    ChannelError::Remote {
        name: name.to_string(),
        error: ErrorResponse::new(ErrorCode::Handler, error.to_string()),
    }
}

impl HostLink for MockHostLink {
    fn search(&self, query: &str) -> Result<Vec<Entry>, ChannelError> {
        self.record(LinkCall::Search(query.to_string()));
        Ok(self.store.lock().search(query))
    }

    fn lookup(&self, brief: &[String]) -> Result<Option<String>, ChannelError> {
        self.record(LinkCall::Lookup(brief.to_vec()));
        Ok(self
            .store
            .lock()
            .lookup(brief)
            .map(|entry| entry.translation.clone()))
    }

    fn add_translation(&self, entry: &Entry) -> Result<bool, ChannelError> {
        self.record(LinkCall::Add(entry.clone()));
        Ok(self.store.lock().add(entry.clone(), true))
    }

    fn edit_translation(&self, old: &Entry, new: &Entry) -> Result<bool, ChannelError> {
        self.record(LinkCall::Edit(old.clone(), new.clone()));
        self.store
            .lock()
            .edit(old, new.clone())
            .map_err(|error| remote_failure("edit_translation", error))
    }

    fn remove_translation(&self, entry: &Entry) -> Result<(), ChannelError> {
        self.record(LinkCall::Remove(entry.clone()));
        self.store
            .lock()
            .remove(entry)
            .map_err(|error| remote_failure("remove_translation", error))
    }

    fn picked(&self, entry: Option<&Entry>) -> Result<(), ChannelError> {
        self.record(LinkCall::Picked(entry.cloned()));
        Ok(())
    }

    fn show_error(&self, message: &str) -> Result<(), ChannelError> {
        self.record(LinkCall::ShowError(message.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct HeadlessView {
    visible: bool,
}

impl HeadlessView {
    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl DialogView for HeadlessView {
    fn show(&mut self) {
        self.visible = true;
        tracing::info!("dialog shown");
    }

    fn hide(&mut self) {
        self.visible = false;
        tracing::info!("dialog hidden");
    }

    fn rows_changed(&mut self, rows: &[Entry], selected: Option<usize>) {
        tracing::debug!(rows = rows.len(), ?selected, "table refreshed");
    }

    fn form_changed(&mut self, _form: &FormFields) {}

    fn set_brief_feedback(&mut self, message: &str) {
        tracing::debug!("brief: {message}");
    }

    fn show_message(&mut self, message: &str) {
        tracing::info!("dialog message: {message}");
    }
}
