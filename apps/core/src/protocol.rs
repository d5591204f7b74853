use serde::{Deserialize, Serialize};

use crate::model::{Entry, Outline};

pub const OPEN_DIALOG: &str = "open_dialog";
pub const CLOSE_DIALOG: &str = "close_dialog";
pub const SEARCH: &str = "search";
pub const LOOKUP: &str = "lookup";
pub const ADD_TRANSLATION: &str = "add_translation";
pub const EDIT_TRANSLATION: &str = "edit_translation";
pub const REMOVE_TRANSLATION: &str = "remove_translation";
pub const PICKED: &str = "picked";
pub const SHOW_ERROR: &str = "show_error";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoArgs {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchArgs {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupArgs {
    pub outline: Outline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryArgs {
    pub entry: Entry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditArgs {
    pub old: Entry,
    pub new: Entry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickedArgs {
    pub entry: Option<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShowErrorArgs {
    pub message: String,
}
