use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::SortOrder;

/// Name of the per-corpus settings file, stored in the notes root.
pub const CONFIG_FILE_NAME: &str = ".notetag.json";

/// Settings for the tag service and whatever presents its results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Ordering used by `TagService::all_tags`.
    pub sort_order: SortOrder,
    /// File extensions treated as notes, without the dot.
    pub extensions: Vec<String>,
    /// Maximum autocomplete suggestions; `None` for no limit.
    pub suggestion_limit: Option<usize>,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            sort_order: SortOrder::CountDesc,
            extensions: vec!["md".to_string(), "txt".to_string()],
            suggestion_limit: Some(20),
        }
    }
}

impl TagConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads settings from `path`, falling back to defaults if the file does
    /// not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
