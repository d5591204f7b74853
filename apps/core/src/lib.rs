pub mod channel;
pub mod config;
pub mod debounce;
pub mod dialog;
pub mod dialog_process;
pub mod dictionary;
pub mod entry_store;
pub mod logging;
pub mod manager;
pub mod model;
pub mod protocol;
pub mod runtime;
pub mod search;
pub mod settings;
pub mod transport;
