use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(50);

pub struct Debouncer<T: Send + 'static> {
    sender: Option<Sender<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration, action: impl FnMut(T) + Send + 'static) -> Self {
        let (sender, receiver) = mpsc::channel::<T>();
        let worker = thread::spawn(move || {
            let mut action = action;
            let mut latest: Option<T> = None;
            loop {
                let next = match latest {
                    Some(_) => receiver.recv_timeout(delay),
                    None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                match next {
                    Ok(value) => latest = Some(value),
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some(value) = latest.take() {
                            action(value);
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            // A burst still pending at shutdown is dropped.
            if latest.is_some() {
                tracing::debug!("debounced value discarded on shutdown");
            }
        });

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    pub fn push(&self, value: T) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(value);
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}
