//! Preset lookup.
//!
//! A preset is a named, reusable step list. Lookups never abort a run: every failure is
//! a [`PresetError`] that the merger logs and treats as an empty contribution.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde_json::Value;
use stepline_types::StepSpec;
use thiserror::Error;

/// File extension of presets stored on disk.
pub const PRESET_FILE_EXTENSION: &str = "json";

/// Recoverable preset lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresetError {
    #[error("preset '{name}' not found (expected at {location})")]
    NotFound { name: String, location: String },
    #[error("preset name '{0}' must be a bare name without path separators or extension")]
    InvalidName(String),
    #[error("preset '{name}' could not be read: {reason}")]
    Unreadable { name: String, reason: String },
    #[error("preset '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },
}

impl PresetError {
    /// The preset name the error refers to.
    pub fn name(&self) -> &str {
        match self {
            Self::NotFound { name, .. } | Self::Unreadable { name, .. } | Self::Malformed { name, .. } => name,
            Self::InvalidName(name) => name,
        }
    }
}

/// Resolves preset names to their stored step lists.
pub trait PresetStore {
    /// Returns the preset's steps verbatim, in stored order.
    fn resolve(&self, name: &str) -> Result<Vec<StepSpec>, PresetError>;
}

/// Preset store backed by `<root>/<name>.json` files.
#[derive(Debug, Clone)]
pub struct DirectoryPresetStore {
    root: PathBuf,
}

impl DirectoryPresetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{PRESET_FILE_EXTENSION}"))
    }
}

impl PresetStore for DirectoryPresetStore {
    fn resolve(&self, name: &str) -> Result<Vec<StepSpec>, PresetError> {
        validate_preset_name(name)?;
        let path = self.path_for(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(PresetError::NotFound {
                    name: name.to_string(),
                    location: path.display().to_string(),
                });
            }
            Err(error) => {
                return Err(PresetError::Unreadable {
                    name: name.to_string(),
                    reason: format!("{}: {error}", path.display()),
                });
            }
        };
        parse_preset_document(name, &content)
    }
}

/// Preset store held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPresetStore {
    presets: IndexMap<String, Vec<StepSpec>>,
}

impl InMemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a preset, returning the store for chaining.
    pub fn with_preset(mut self, name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        self.insert(name, steps);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, steps: Vec<StepSpec>) {
        self.presets.insert(name.into(), steps);
    }
}

impl PresetStore for InMemoryPresetStore {
    fn resolve(&self, name: &str) -> Result<Vec<StepSpec>, PresetError> {
        validate_preset_name(name)?;
        self.presets.get(name).cloned().ok_or_else(|| PresetError::NotFound {
            name: name.to_string(),
            location: "in-memory preset store".to_string(),
        })
    }
}

/// Rejects names that would escape the store or smuggle in an extension.
fn validate_preset_name(name: &str) -> Result<(), PresetError> {
    let invalid = name.trim().is_empty()
        || name != name.trim()
        || name.contains(['/', '\\', '.'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(PresetError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Parses a preset document: a JSON list of step records.
fn parse_preset_document(name: &str, content: &str) -> Result<Vec<StepSpec>, PresetError> {
    let malformed = |reason: String| PresetError::Malformed {
        name: name.to_string(),
        reason,
    };
    let document: Value = serde_json::from_str(content).map_err(|error| malformed(format!("invalid JSON: {error}")))?;
    let Value::Array(entries) = document else {
        return Err(malformed("document does not contain a JSON list".to_string()));
    };
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            if !entry.is_object() {
                return Err(malformed(format!("element {index} is not a step object")));
            }
            serde_json::from_value::<StepSpec>(entry).map_err(|error| malformed(format!("element {index}: {error}")))
        })
        .collect()
}
