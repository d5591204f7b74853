use serde::{Deserialize, Serialize};

pub const DEFAULT_SEARCH_STROKE: &str = "SPWR-FP";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionarySettings {
    pub search_stroke: String,
    pub accept_stroke: String,
    pub pick_on_write: bool,
}

impl Default for DictionarySettings {
    fn default() -> Self {
        Self {
            search_stroke: DEFAULT_SEARCH_STROKE.to_string(),
            accept_stroke: String::new(),
            pick_on_write: false,
        }
    }
}

impl DictionarySettings {
    pub fn search_outline(&self) -> Vec<String> {
        vec![self.search_stroke.clone()]
    }
}

pub fn validate_stroke(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Search stroke is required.".to_string());
    }

    if trimmed.contains('/') || trimmed.chars().any(char::is_whitespace) {
        return Err(format!(
            "Search stroke '{trimmed}' must be a single stroke without '/' or spaces."
        ));
    }

    Ok(trimmed.to_string())
}

pub fn validate(settings: &DictionarySettings) -> Result<(), String> {
    validate_stroke(&settings.search_stroke)?;
    if !settings.accept_stroke.is_empty() {
        validate_stroke(&settings.accept_stroke)?;
    }
    Ok(())
}
