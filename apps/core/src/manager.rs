use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::{Channel, ChannelBuilder, ChannelError};
use crate::config::{Config, ConfigError};
use crate::dictionary::Dictionary;
use crate::entry_store::StoreError;
use crate::model::{Entry, Outline};
use crate::protocol::{
    EditArgs, EntryArgs, LookupArgs, NoArgs, PickedArgs, SearchArgs, ShowErrorArgs,
    ADD_TRANSLATION, CLOSE_DIALOG, EDIT_TRANSLATION, LOOKUP, OPEN_DIALOG, PICKED,
    REMOVE_TRANSLATION, SEARCH, SHOW_ERROR,
};
use crate::transport::{ErrorCode, ErrorResponse};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to send output: {0}")]
    Inject(String),
}

pub trait HostEngine: Send + Sync {
    fn inject(&self, translation: &str) -> Result<(), HostError>;

    fn raw_lookup(&self, _outline: &[String]) -> Option<String> {
        None
    }

    fn report_error(&self, message: &str) {
        tracing::error!("dialog reported: {message}");
    }
}

#[derive(Debug, Default)]
pub struct MockHostEngine {
    injected: Mutex<Vec<String>>,
    mappings: Mutex<HashMap<Outline, String>>,
    errors: Mutex<Vec<String>>,
    fail_injections: AtomicBool,
}

impl MockHostEngine {
    pub fn with_mapping(self, outline: &[&str], translation: &str) -> Self {
        let outline = outline.iter().map(|s| s.to_string()).collect();
        self.mappings.lock().insert(outline, translation.to_string());
        self
    }

    pub fn injected(&self) -> Vec<String> {
        self.injected.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn set_fail_injections(&self, fail: bool) {
        self.fail_injections.store(fail, Ordering::SeqCst);
    }
}

impl HostEngine for MockHostEngine {
    fn inject(&self, translation: &str) -> Result<(), HostError> {
        if self.fail_injections.load(Ordering::SeqCst) {
            return Err(HostError::Inject("output is unavailable".to_string()));
        }
        self.injected.lock().push(translation.to_string());
        Ok(())
    }

    fn raw_lookup(&self, outline: &[String]) -> Option<String> {
        self.mappings.lock().get(outline).cloned()
    }

    fn report_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("a dialog is already open for {}", .0.display())]
    DialogBusy(PathBuf),
    #[error("no translation has been sent yet")]
    NothingToResend,
    #[error("no dialog is open")]
    NoDialogOpen,
    #[error("failed to start dialog process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Host(#[from] HostError),
}

struct HostState {
    engine: Arc<dyn HostEngine>,
    active: Mutex<Option<Arc<Dictionary>>>,
    last_translation: Mutex<Option<String>>,
}

impl HostState {
    fn active(&self) -> Result<Arc<Dictionary>, ErrorResponse> {
        self.active
            .lock()
            .clone()
            .ok_or_else(|| ErrorResponse::new(ErrorCode::Handler, "no dictionary is open"))
    }

    fn inject(&self, translation: &str) -> Result<(), HostError> {
        self.engine.inject(translation)?;
        *self.last_translation.lock() = Some(translation.to_string());
        Ok(())
    }

    fn search(&self, args: SearchArgs) -> Result<Vec<Entry>, ErrorResponse> {
        let dictionary = self.active()?;
        dictionary.search(&args.query).map_err(store_failure)
    }

    fn lookup(&self, args: LookupArgs) -> Result<Option<String>, ErrorResponse> {
        if let Some(translation) = self.engine.raw_lookup(&args.outline) {
            return Ok(Some(translation));
        }
        let Some(dictionary) = self.active.lock().clone() else {
            return Ok(None);
        };
        let entry = dictionary.lookup(&args.outline).map_err(store_failure)?;
        Ok(entry.map(|entry| entry.translation))
    }

    fn add_translation(&self, args: EntryArgs) -> Result<bool, ErrorResponse> {
        let dictionary = self.active()?;
        let added = dictionary.add(args.entry).map_err(store_failure)?;
        if added {
            persist(&dictionary);
        }
        Ok(added)
    }

    fn edit_translation(&self, args: EditArgs) -> Result<bool, ErrorResponse> {
        let dictionary = self.active()?;
        let edited = dictionary.edit(&args.old, args.new).map_err(store_failure)?;
        if edited {
            persist(&dictionary);
        }
        Ok(edited)
    }

    fn remove_translation(&self, args: EntryArgs) {
        let Ok(dictionary) = self.active() else {
            tracing::error!(entry = %args.entry, "remove requested with no dictionary open");
            return;
        };
        match dictionary.remove(&args.entry) {
            Ok(()) => persist(&dictionary),
            Err(error) => tracing::error!(entry = %args.entry, "remove failed: {error}"),
        }
    }

    fn picked(&self, args: PickedArgs) {
        self.active.lock().take();
        let Some(entry) = args.entry else {
            tracing::debug!("dialog dismissed without a pick");
            return;
        };
        if !entry.is_valid() {
            tracing::error!(entry = %entry, "refusing to inject an entry with blank fields");
            return;
        }
        if let Err(error) = self.inject(&entry.translation) {
            tracing::error!(entry = %entry, "{error}");
        }
    }
}

fn store_failure(error: StoreError) -> ErrorResponse {
    if error.is_fatal() {
        tracing::error!("store failure: {error}");
    }
    ErrorResponse::new(ErrorCode::Handler, error.to_string())
}

// Best-effort; the in-memory store stays authoritative.
fn persist(dictionary: &Dictionary) {
    if let Err(error) = dictionary.save() {
        tracing::error!(path = %dictionary.path().display(), "failed to save dictionary: {error}");
    }
}

pub struct HostManager {
    state: Arc<HostState>,
    channel: Option<Channel>,
    child: Option<Child>,
    request_timeout: Duration,
}

impl HostManager {
    pub fn start(config: &Config, engine: Arc<dyn HostEngine>) -> Result<Self, ManagerError> {
        let (program, args) = config.dialog_command()?;
        tracing::info!(program = %program.display(), ?args, "starting dialog process");
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ManagerError::Spawn)?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.kill();
            return Err(ManagerError::Spawn(std::io::Error::other(
                "dialog process stdio was not captured",
            )));
        };

        let mut manager = Self::with_transport(stdout, stdin, engine, config.request_timeout());
        manager.child = Some(child);
        Ok(manager)
    }

    pub fn with_transport<R, W>(
        reader: R,
        writer: W,
        engine: Arc<dyn HostEngine>,
        request_timeout: Duration,
    ) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let state = Arc::new(HostState {
            engine,
            active: Mutex::new(None),
            last_translation: Mutex::new(None),
        });

        let channel = {
            let search = Arc::clone(&state);
            let lookup = Arc::clone(&state);
            let add = Arc::clone(&state);
            let edit = Arc::clone(&state);
            let remove = Arc::clone(&state);
            let picked = Arc::clone(&state);
            let errors = Arc::clone(&state);
            let disconnected = Arc::clone(&state);
            ChannelBuilder::new()
                .on_request(SEARCH, move |args: SearchArgs| search.search(args))
                .on_request(LOOKUP, move |args: LookupArgs| lookup.lookup(args))
                .on_request(ADD_TRANSLATION, move |args: EntryArgs| add.add_translation(args))
                .on_request(EDIT_TRANSLATION, move |args: EditArgs| {
                    edit.edit_translation(args)
                })
                .on_call(REMOVE_TRANSLATION, move |args: EntryArgs| {
                    remove.remove_translation(args)
                })
                .on_call(PICKED, move |args: PickedArgs| picked.picked(args))
                .on_call(SHOW_ERROR, move |args: ShowErrorArgs| {
                    errors.engine.report_error(&args.message)
                })
                .on_protocol_error(|message| tracing::error!("dialog protocol error: {message}"))
                .on_disconnect(move || {
                    tracing::warn!("dialog process disconnected");
                    disconnected.active.lock().take();
                })
                .spawn(reader, writer)
        };

        Self {
            state,
            channel: Some(channel),
            child: None,
            request_timeout,
        }
    }

    fn channel(&self) -> Result<&Channel, ManagerError> {
        self.channel
            .as_ref()
            .ok_or(ManagerError::Channel(ChannelError::Disconnected))
    }

    pub fn open_dialog(&self, dictionary: Arc<Dictionary>) -> Result<(), ManagerError> {
        let channel = self.channel()?;
        {
            let mut active = self.state.active.lock();
            if let Some(current) = active.as_ref() {
                return Err(ManagerError::DialogBusy(current.path().to_path_buf()));
            }
            *active = Some(Arc::clone(&dictionary));
        }

        if let Err(error) = channel.call(OPEN_DIALOG, &NoArgs {}) {
            self.state.active.lock().take();
            return Err(error.into());
        }
        tracing::info!(path = %dictionary.path().display(), "dialog requested");
        Ok(())
    }

    pub fn close_dialog(&self) -> Result<(), ManagerError> {
        if self.state.active.lock().is_none() {
            tracing::warn!("close requested with no dialog open");
            return Err(ManagerError::NoDialogOpen);
        }
        let channel = self.channel()?;
        let result = channel.request::<_, ()>(CLOSE_DIALOG, &NoArgs {}, self.request_timeout);
        self.state.active.lock().take();
        result.map_err(ManagerError::from)
    }

    pub fn active_dictionary(&self) -> Option<Arc<Dictionary>> {
        self.state.active.lock().clone()
    }

    pub fn is_showing(&self, dictionary: &Arc<Dictionary>) -> bool {
        self.state
            .active
            .lock()
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, dictionary))
    }

    pub fn translate(
        &self,
        dictionary: &Arc<Dictionary>,
        outline: &[String],
    ) -> Result<Option<String>, StoreError> {
        dictionary.translate(outline, self.is_showing(dictionary))
    }

    pub fn resend_last(&self) -> Result<(), ManagerError> {
        let last = self.state.last_translation.lock().clone();
        let translation = last.ok_or(ManagerError::NothingToResend)?;
        self.state.engine.inject(&translation)?;
        Ok(())
    }

    pub fn last_translation(&self) -> Option<String> {
        self.state.last_translation.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(Channel::is_connected)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.shutdown();
        }
        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) => tracing::info!(%status, "dialog process exited"),
                Err(error) => tracing::warn!("failed to wait for dialog process: {error}"),
            }
        }
    }
}

impl Drop for HostManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
