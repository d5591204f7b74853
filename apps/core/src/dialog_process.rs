use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::channel::{Channel, ChannelBuilder, ChannelError, Responder};
use crate::debounce::{Debouncer, DEFAULT_DEBOUNCE_DELAY};
use crate::dialog::{DialogSession, DialogView, HostLink, SearchTicket, SessionError};
use crate::model::Entry;
use crate::protocol::{
    EditArgs, EntryArgs, LookupArgs, NoArgs, PickedArgs, SearchArgs, ShowErrorArgs,
    ADD_TRANSLATION, CLOSE_DIALOG, EDIT_TRANSLATION, LOOKUP, OPEN_DIALOG, PICKED,
    REMOVE_TRANSLATION, SEARCH, SHOW_ERROR,
};
use crate::transport::{ErrorCode, ErrorResponse};

pub struct ChannelHostLink {
    channel: Arc<Channel>,
    timeout: Duration,
}

impl ChannelHostLink {
    pub fn new(channel: Arc<Channel>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }
}

impl HostLink for ChannelHostLink {
    fn search(&self, query: &str) -> Result<Vec<Entry>, ChannelError> {
        let args = SearchArgs {
            query: query.to_string(),
        };
        self.channel.request(SEARCH, &args, self.timeout)
    }

    fn lookup(&self, brief: &[String]) -> Result<Option<String>, ChannelError> {
        let args = LookupArgs {
            outline: brief.to_vec(),
        };
        self.channel.request(LOOKUP, &args, self.timeout)
    }

    fn add_translation(&self, entry: &Entry) -> Result<bool, ChannelError> {
        let args = EntryArgs {
            entry: entry.clone(),
        };
        self.channel.request(ADD_TRANSLATION, &args, self.timeout)
    }

    fn edit_translation(&self, old: &Entry, new: &Entry) -> Result<bool, ChannelError> {
        let args = EditArgs {
            old: old.clone(),
            new: new.clone(),
        };
        self.channel.request(EDIT_TRANSLATION, &args, self.timeout)
    }

    fn remove_translation(&self, entry: &Entry) -> Result<(), ChannelError> {
        let args = EntryArgs {
            entry: entry.clone(),
        };
        self.channel.call(REMOVE_TRANSLATION, &args)
    }

    fn picked(&self, entry: Option<&Entry>) -> Result<(), ChannelError> {
        let args = PickedArgs {
            entry: entry.cloned(),
        };
        self.channel.call(PICKED, &args)
    }

    fn show_error(&self, message: &str) -> Result<(), ChannelError> {
        let args = ShowErrorArgs {
            message: message.to_string(),
        };
        self.channel.call(SHOW_ERROR, &args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    DescriptionEdited(String),
    TranslationEdited(String),
    BriefEdited(String),
    SetDescription(String),
    SelectRow(usize),
    Pick,
    StartEdit,
    Submit,
    Delete,
    Cancel,
}

enum UiTask {
    Open,
    Close(Responder),
    Results(SearchTicket, Result<Vec<Entry>, ChannelError>),
    ProtocolError(String),
    Event(UiEvent),
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
pub struct DialogOptions {
    pub request_timeout: Duration,
    pub search_debounce: Duration,
}

impl Default for DialogOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            search_debounce: DEFAULT_DEBOUNCE_DELAY,
        }
    }
}

pub struct DialogProcess {
    tasks: Sender<UiTask>,
    ui_thread: Option<JoinHandle<()>>,
}

impl DialogProcess {
    pub fn spawn<R, W, V>(reader: R, writer: W, view: V, options: DialogOptions) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
        V: DialogView + 'static,
    {
        let (tasks, inbox) = mpsc::channel::<UiTask>();

        let channel = {
            let open = tasks.clone();
            let close = tasks.clone();
            let protocol = tasks.clone();
            let disconnected = tasks.clone();
            ChannelBuilder::new()
                .on_call(OPEN_DIALOG, move |_: NoArgs| {
                    let _ = open.send(UiTask::Open);
                })
                .on_deferred_request(CLOSE_DIALOG, move |_: NoArgs, responder| {
                    // On send failure the responder is dropped, which answers
                    // the host with an error.
                    let _ = close.send(UiTask::Close(responder));
                })
                .on_protocol_error(move |message| {
                    let _ = protocol.send(UiTask::ProtocolError(message));
                })
                .on_disconnect(move || {
                    let _ = disconnected.send(UiTask::Disconnected);
                })
                .spawn(reader, writer)
        };
        let channel = Arc::new(channel);

        let results = tasks.clone();
        let ui_thread = thread::Builder::new()
            .name("dialog-ui".to_string())
            .spawn(move || {
                let link: Arc<dyn HostLink> =
                    Arc::new(ChannelHostLink::new(channel, options.request_timeout));
                ui_loop(inbox, results, link, view, options.search_debounce);
            });
        let ui_thread = match ui_thread {
            Ok(handle) => Some(handle),
            Err(error) => {
                tracing::error!("failed to start dialog ui thread: {error}");
                None
            }
        };

        Self { tasks, ui_thread }
    }

    pub fn post(&self, event: UiEvent) -> bool {
        self.tasks.send(UiTask::Event(event)).is_ok()
    }

    pub fn wait(mut self) {
        if let Some(ui_thread) = self.ui_thread.take() {
            let _ = ui_thread.join();
        }
    }
}

fn ui_loop<V: DialogView>(
    inbox: Receiver<UiTask>,
    results: Sender<UiTask>,
    link: Arc<dyn HostLink>,
    view: V,
    debounce: Duration,
) {
    let search_link = Arc::clone(&link);
    let searches = Debouncer::new(debounce, move |ticket: SearchTicket| {
        let outcome = search_link.search(&ticket.query);
        let _ = results.send(UiTask::Results(ticket, outcome));
    });
    let mut session = DialogSession::new(Arc::clone(&link), view);

    while let Ok(task) = inbox.recv() {
        let outcome = match task {
            UiTask::Open => session.open().map(Some),
            UiTask::Close(responder) => close(&mut session, responder),
            UiTask::Results(ticket, outcome) => {
                session.apply_search_results(&ticket, outcome).map(|_| None)
            }
            UiTask::ProtocolError(message) => {
                report_to_host(link.as_ref(), &message);
                Ok(None)
            }
            UiTask::Event(event) => handle_event(&mut session, event),
            UiTask::Disconnected => {
                session.tear_down();
                break;
            }
        };

        match outcome {
            Ok(Some(ticket)) => searches.push(ticket),
            Ok(None) => {}
            Err(error) if error.is_fatal() => {
                tracing::error!("dialog session failed: {error}");
                report_to_host(link.as_ref(), &error.to_string());
                session.tear_down();
            }
            Err(error) => session.view_mut().show_message(&error.to_string()),
        }
    }
    tracing::info!("dialog ui loop finished");
}

fn close<V: DialogView>(
    session: &mut DialogSession<V>,
    responder: Responder,
) -> Result<Option<SearchTicket>, SessionError> {
    match session.close() {
        Ok(()) => {
            responder.respond(Ok(()));
            Ok(None)
        }
        Err(error) => {
            responder.respond::<()>(Err(ErrorResponse::new(
                ErrorCode::Handler,
                error.to_string(),
            )));
            Err(error)
        }
    }
}

fn handle_event<V: DialogView>(
    session: &mut DialogSession<V>,
    event: UiEvent,
) -> Result<Option<SearchTicket>, SessionError> {
    match event {
        UiEvent::DescriptionEdited(text) => Ok(session.description_changed(&text)),
        UiEvent::TranslationEdited(text) => {
            session.translation_changed(&text);
            Ok(None)
        }
        UiEvent::BriefEdited(text) => session.brief_changed(&text).map(|()| None),
        UiEvent::SetDescription(text) => session.set_description_text(&text).map(|()| None),
        UiEvent::SelectRow(row) => {
            session.select_row(row);
            Ok(None)
        }
        UiEvent::Pick => session.pick().map(|_| None),
        UiEvent::StartEdit => session.start_edit().map(|()| None),
        UiEvent::Submit => session.submit().map(|()| None),
        UiEvent::Delete => session.delete().map(|_| None),
        UiEvent::Cancel => session.cancel().map(|()| None),
    }
}

fn report_to_host(link: &dyn HostLink, message: &str) {
    if let Err(error) = link.show_error(message) {
        tracing::warn!("could not report error to host: {error}");
    }
}
