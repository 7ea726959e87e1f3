//! Step definitions as authored by callers and as identified by the compiler.
//!
//! A [`StepSpec`] mirrors one element of a preset file or of the custom action list.
//! Field names follow the workflow authoring conventions (`uses`, `run`, `with`,
//! `shell`, `working-directory`) so preset files and inline YAML deserialize directly.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// A single requested unit of work.
///
/// Exactly one of `uses` or `run` must be present. The check is deferred to
/// [`StepSpec::kind`] so that a malformed step can be reported with its position in
/// the merged sequence instead of failing deserialization of the whole list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StepSpec {
    /// Optional display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Reference to an external action, e.g. `actions/checkout@v4`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    /// Inline script body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    /// Inputs for an action step. Only meaningful alongside `uses`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<IndexMap<String, JsonValue>>,
    /// Interpreter for a script step. Only meaningful alongside `run`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Working directory for a script step. Only meaningful alongside `run`.
    #[serde(
        default,
        rename = "working-directory",
        alias = "workingDirectory",
        alias = "working_directory",
        skip_serializing_if = "Option::is_none"
    )]
    pub working_directory: Option<String>,
}

/// The two recognized execution modes of a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// References an external action.
    Uses,
    /// Executes an inline script.
    Run,
}

/// Structural problems that make a [`StepSpec`] unusable.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum StepShapeError {
    /// Neither `uses` nor `run` was declared.
    #[error("step must declare one of 'uses' or 'run'")]
    MissingMode,
    /// Both `uses` and `run` were declared.
    #[error("step declares both 'uses' and 'run'; exactly one is allowed")]
    ConflictingModes,
}

impl StepSpec {
    /// Builds an action step.
    pub fn action(uses: impl Into<String>) -> Self {
        Self {
            uses: Some(uses.into()),
            ..Default::default()
        }
    }

    /// Builds a script step.
    pub fn script(run: impl Into<String>) -> Self {
        Self {
            run: Some(run.into()),
            ..Default::default()
        }
    }

    /// Sets the display label.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the declared execution mode.
    ///
    /// Blank strings count as absent, so `run: ""` is treated the same as a missing
    /// `run` key.
    pub fn kind(&self) -> Result<StepKind, StepShapeError> {
        match (non_blank(self.uses.as_deref()), non_blank(self.run.as_deref())) {
            (Some(_), None) => Ok(StepKind::Uses),
            (None, Some(_)) => Ok(StepKind::Run),
            (Some(_), Some(_)) => Err(StepShapeError::ConflictingModes),
            (None, None) => Err(StepShapeError::MissingMode),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

/// Identity the compiler assigns to one step of the canonical sequence.
///
/// The same `id` is written into the generated descriptor and later used to join the
/// engine's per-step results back to the requested step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepIdentity {
    /// Unique, deterministic identifier, e.g. `action_0_actions-checkout`.
    pub id: String,
    /// Human-readable label with whitespace collapsed.
    pub display_name: String,
    /// Execution mode the step declared.
    pub kind: StepKind,
    /// The `uses` target for action steps.
    pub reference: Option<String>,
    /// The script body for script steps.
    pub script: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_requires_exactly_one_mode() {
        assert_eq!(StepSpec::action("actions/checkout@v4").kind(), Ok(StepKind::Uses));
        assert_eq!(StepSpec::script("echo hi").kind(), Ok(StepKind::Run));
        assert_eq!(StepSpec::default().kind(), Err(StepShapeError::MissingMode));

        let both = StepSpec {
            uses: Some("actions/checkout@v4".into()),
            run: Some("echo hi".into()),
            ..Default::default()
        };
        assert_eq!(both.kind(), Err(StepShapeError::ConflictingModes));
    }

    #[test]
    fn blank_modes_count_as_missing() {
        let step = StepSpec {
            uses: Some("  ".into()),
            run: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(step.kind(), Err(StepShapeError::MissingMode));
    }

    #[test]
    fn deserializes_authoring_field_names() {
        let yaml = r#"
name: Build
run: make
shell: sh
working-directory: app
"#;
        let step: StepSpec = serde_yaml::from_str(yaml).expect("parse step");
        assert_eq!(step.name.as_deref(), Some("Build"));
        assert_eq!(step.shell.as_deref(), Some("sh"));
        assert_eq!(step.working_directory.as_deref(), Some("app"));

        let camel: StepSpec = serde_yaml::from_str("run: make\nworkingDirectory: app\n").expect("parse camel case");
        assert_eq!(camel.working_directory.as_deref(), Some("app"));
    }

    #[test]
    fn action_inputs_keep_authoring_order() {
        let yaml = r#"
uses: actions/setup-node@v4
with:
  node-version: 20
  cache: npm
"#;
        let step: StepSpec = serde_yaml::from_str(yaml).expect("parse step");
        let keys: Vec<&str> = step.with.as_ref().expect("with present").keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["node-version", "cache"]);
    }
}
