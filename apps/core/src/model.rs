use serde::{Deserialize, Serialize};

pub type Outline = Vec<String>;

type EntryTuple = (String, String, Outline);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "EntryTuple", into = "EntryTuple")]
pub struct Entry {
    pub translation: String,
    pub description: String,
    pub brief: Outline,
}

impl Entry {
    pub fn new(translation: &str, description: &str, brief: &[&str]) -> Self {
        Self::from_owned(
            translation.to_string(),
            description.to_string(),
            brief.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn from_owned(translation: String, description: String, brief: Outline) -> Self {
        Self {
            translation,
            description,
            brief,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.translation.is_empty() && !self.description.is_empty()
    }

    pub fn has_brief(&self) -> bool {
        !self.brief.is_empty()
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({} -> {} | {})",
            outline_to_text(&self.brief),
            self.translation,
            self.description
        )
    }
}

impl From<EntryTuple> for Entry {
    fn from((translation, description, brief): EntryTuple) -> Self {
        Self::from_owned(translation, description, brief)
    }
}

impl From<Entry> for EntryTuple {
    fn from(value: Entry) -> Self {
        (value.translation, value.description, value.brief)
    }
}

pub fn text_to_outline(input: &str) -> Outline {
    input
        .split(|c: char| c == '/' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}

pub fn outline_to_text(outline: &[String]) -> String {
    outline.join("/")
}
