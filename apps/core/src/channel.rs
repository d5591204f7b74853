use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::transport::{
    read_frame, write_frame, ErrorCode, ErrorResponse, Frame, FrameError, Reply,
};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("peer disconnected")]
    Disconnected,
    #[error("request '{0}' timed out after {1:?}")]
    Timeout(String, Duration),
    #[error("request '{0}' is already in flight")]
    Overlapping(String),
    #[error("request '{0}' issued from the receive thread would never see its reply")]
    ReceiveThread(String),
    #[error("peer failed '{name}': {}", .error.message)]
    Remote { name: String, error: ErrorResponse },
    #[error("invalid payload for '{name}': {source}")]
    Payload {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Frame(FrameError),
}

type CallHandler = Box<dyn Fn(Value) -> Result<(), ErrorResponse> + Send + Sync>;
type RequestHandler = Box<dyn Fn(Value, Responder) + Send + Sync>;
type ProtocolErrorHook = Box<dyn Fn(String) + Send + Sync>;
type DisconnectHook = Box<dyn FnOnce() + Send>;
type PendingSlot = (String, Sender<Result<Value, ChannelError>>);

enum Handler {
    Call(CallHandler),
    Request(RequestHandler),
}

struct Shared {
    writer: Mutex<Box<dyn Write + Send>>,
    pending: Mutex<HashMap<u64, PendingSlot>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    receive_thread: OnceLock<ThreadId>,
}

impl Shared {
    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::Disconnected);
        }
        let mut writer = self.writer.lock();
        write_frame(&mut **writer, frame).map_err(|error| match error {
            FrameError::Io(_) => ChannelError::Disconnected,
            other => ChannelError::Frame(other),
        })
    }

    fn fail_pending(&self) {
        let pending: Vec<PendingSlot> = self.pending.lock().drain().map(|(_, slot)| slot).collect();
        for (name, slot) in pending {
            tracing::debug!(name = %name, "failing in-flight request after disconnect");
            let _ = slot.send(Err(ChannelError::Disconnected));
        }
    }
}

// Dropping a Responder unanswered replies with ErrorCode::Dropped.
pub struct Responder {
    shared: Arc<Shared>,
    id: u64,
    name: String,
    answered: bool,
}

impl Responder {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn respond<R: Serialize>(mut self, result: Result<R, ErrorResponse>) {
        self.answered = true;
        let reply = match result.and_then(|value| {
            serde_json::to_value(value)
                .map_err(|e| ErrorResponse::new(ErrorCode::Handler, e.to_string()))
        }) {
            Ok(value) => Reply::Ok { value },
            Err(error) => Reply::Err { error },
        };
        self.send_reply(reply);
    }

    fn send_reply(&self, reply: Reply) {
        let frame = Frame::Response { id: self.id, reply };
        if let Err(error) = self.shared.send(&frame) {
            tracing::warn!(name = %self.name, "reply not delivered: {error}");
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if !self.answered {
            self.send_reply(Reply::Err {
                error: ErrorResponse::new(
                    ErrorCode::Dropped,
                    format!("handler for '{}' dropped the request", self.name),
                ),
            });
        }
    }
}

#[derive(Default)]
pub struct ChannelBuilder {
    handlers: HashMap<String, Handler>,
    on_protocol_error: Option<ProtocolErrorHook>,
    on_disconnect: Option<DisconnectHook>,
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_call<A, F>(mut self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned,
        F: Fn(A) + Send + Sync + 'static,
    {
        let call: CallHandler = Box::new(move |args| {
            let args = serde_json::from_value::<A>(args)
                .map_err(|e| ErrorResponse::new(ErrorCode::InvalidPayload, e.to_string()))?;
            handler(args);
            Ok(())
        });
        self.handlers.insert(name.to_string(), Handler::Call(call));
        self
    }

    pub fn on_request<A, R, F>(self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> Result<R, ErrorResponse> + Send + Sync + 'static,
    {
        self.on_deferred_request(name, move |args: A, responder: Responder| {
            responder.respond(handler(args));
        })
    }

    pub fn on_deferred_request<A, F>(mut self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned,
        F: Fn(A, Responder) + Send + Sync + 'static,
    {
        let request: RequestHandler = Box::new(move |args, responder| {
            match serde_json::from_value::<A>(args) {
                Ok(args) => handler(args, responder),
                Err(error) => responder.respond::<()>(Err(ErrorResponse::new(
                    ErrorCode::InvalidPayload,
                    error.to_string(),
                ))),
            }
        });
        self.handlers.insert(name.to_string(), Handler::Request(request));
        self
    }

    pub fn on_protocol_error(mut self, hook: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_protocol_error = Some(Box::new(hook));
        self
    }

    pub fn on_disconnect(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_disconnect = Some(Box::new(hook));
        self
    }

    pub fn spawn<R, W>(self, reader: R, writer: W) -> Channel
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let shared = Arc::new(Shared {
            writer: Mutex::new(Box::new(writer)),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            receive_thread: OnceLock::new(),
        });

        let loop_shared = Arc::clone(&shared);
        let receiver = thread::spawn(move || {
            let _ = loop_shared.receive_thread.set(thread::current().id());
            receive_loop(&loop_shared, reader, &self.handlers, self.on_protocol_error.as_ref());
            loop_shared.connected.store(false, Ordering::SeqCst);
            loop_shared.fail_pending();
            if let Some(hook) = self.on_disconnect {
                hook();
            }
        });

        Channel {
            shared,
            receiver: Some(receiver),
        }
    }
}

fn receive_loop<R: Read>(
    shared: &Arc<Shared>,
    mut reader: R,
    handlers: &HashMap<String, Handler>,
    on_protocol_error: Option<&ProtocolErrorHook>,
) {
    loop {
        match read_frame(&mut reader) {
            Ok(Some(frame)) => dispatch(shared, handlers, on_protocol_error, frame),
            Ok(None) => {
                tracing::info!("peer closed the channel");
                return;
            }
            Err(error) => {
                tracing::error!("channel read failed: {error}");
                return;
            }
        }
    }
}

fn dispatch(
    shared: &Arc<Shared>,
    handlers: &HashMap<String, Handler>,
    on_protocol_error: Option<&ProtocolErrorHook>,
    frame: Frame,
) {
    match frame {
        Frame::Call { name, args } => {
            tracing::debug!(name = %name, "call received");
            let failure = match handlers.get(&name) {
                Some(Handler::Call(handler)) => handler(args)
                    .err()
                    .map(|error| format!("bad payload for '{name}': {}", error.message)),
                _ => Some(format!("message type '{name}' not recognized")),
            };
            if let Some(message) = failure {
                tracing::warn!("{message}");
                if let Some(hook) = on_protocol_error {
                    hook(message);
                }
            }
        }
        Frame::Request { id, name, args } => {
            tracing::debug!(name = %name, id, "request received");
            let responder = Responder {
                shared: Arc::clone(shared),
                id,
                name: name.clone(),
                answered: false,
            };
            match handlers.get(&name) {
                Some(Handler::Request(handler)) => handler(args, responder),
                _ => responder.respond::<()>(Err(ErrorResponse::new(
                    ErrorCode::UnknownMethod,
                    format!("message type '{name}' not recognized"),
                ))),
            }
        }
        Frame::Response { id, reply } => {
            let Some((name, slot)) = shared.pending.lock().remove(&id) else {
                tracing::warn!(id, "reply for a request nobody is waiting on");
                return;
            };
            let result = match reply {
                Reply::Ok { value } => Ok(value),
                Reply::Err { error } => Err(ChannelError::Remote { name, error }),
            };
            let _ = slot.send(result);
        }
    }
}

pub struct Channel {
    shared: Arc<Shared>,
    receiver: Option<JoinHandle<()>>,
}

impl Channel {
    pub fn call<A: Serialize>(&self, name: &str, args: &A) -> Result<(), ChannelError> {
        let args = encode(name, args)?;
        tracing::debug!(name, "call sent");
        self.shared.send(&Frame::Call {
            name: name.to_string(),
            args,
        })
    }

    pub fn request<A, R>(&self, name: &str, args: &A, timeout: Duration) -> Result<R, ChannelError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        if self.shared.receive_thread.get() == Some(&thread::current().id()) {
            return Err(ChannelError::ReceiveThread(name.to_string()));
        }
        let args = encode(name, args)?;
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel();
        {
            let mut pending = self.shared.pending.lock();
            if pending.values().any(|(pending_name, _)| pending_name == name) {
                return Err(ChannelError::Overlapping(name.to_string()));
            }
            pending.insert(id, (name.to_string(), sender));
        }

        tracing::debug!(name, id, "request sent");
        let sent = self.shared.send(&Frame::Request {
            id,
            name: name.to_string(),
            args,
        });
        if let Err(error) = sent {
            self.shared.pending.lock().remove(&id);
            return Err(error);
        }

        let value = match receiver.recv_timeout(timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                self.shared.pending.lock().remove(&id);
                return Err(ChannelError::Timeout(name.to_string(), timeout));
            }
            Err(RecvTimeoutError::Disconnected) => return Err(ChannelError::Disconnected),
        };
        serde_json::from_value(value).map_err(|source| ChannelError::Payload {
            name: name.to_string(),
            source,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn shutdown(mut self) {
        self.close_writer();
        if let Some(receiver) = self.receiver.take() {
            if receiver.thread().id() != thread::current().id() {
                let _ = receiver.join();
            }
        }
    }

    fn close_writer(&self) {
        *self.shared.writer.lock() = Box::new(io::sink());
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close_writer();
    }
}

fn encode<A: Serialize>(name: &str, args: &A) -> Result<Value, ChannelError> {
    serde_json::to_value(args).map_err(|source| ChannelError::Payload {
        name: name.to_string(),
        source,
    })
}
