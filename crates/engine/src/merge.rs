//! Input parsing and step-list merging.
//!
//! The two raw inputs arrive as YAML text. Both must be sequences; the preset input
//! holds names, the action list holds step records. Merging expands presets in request
//! order and appends custom steps after all of them, with no reordering or
//! deduplication.

use serde_yaml::Value as YamlValue;
use stepline_types::StepSpec;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::preset::{PresetError, PresetStore};

/// Name of the preset list input, as reported in errors.
pub const PRESETS_INPUT: &str = "presets";
/// Name of the custom step list input, as reported in errors.
pub const ACTION_LIST_INPUT: &str = "action_list";

/// Ordered list of steps; position determines both descriptor order and identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalSequence {
    steps: Vec<StepSpec>,
}

impl CanonicalSequence {
    pub fn new(steps: Vec<StepSpec>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepSpec> {
        self.steps.iter()
    }
}

/// Result of merging: the canonical sequence plus the presets that contributed nothing.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub sequence: CanonicalSequence,
    pub skipped_presets: Vec<PresetError>,
}

/// Parses the `presets` input into an ordered list of names.
///
/// Scalars are accepted as names (so `[checkout, 2024]` yields `"checkout"` and
/// `"2024"`); nested mappings or sequences are rejected.
pub fn parse_preset_names(raw: &str) -> Result<Vec<String>, PipelineError> {
    parse_sequence(PRESETS_INPUT, raw)?
        .into_iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            YamlValue::String(name) => Ok(name),
            YamlValue::Number(number) => Ok(number.to_string()),
            YamlValue::Bool(flag) => Ok(flag.to_string()),
            other => Err(PipelineError::invalid_shape(
                PRESETS_INPUT,
                format!("element {index} must be a preset name, got {}", describe(&other)),
            )),
        })
        .collect()
}

/// Parses the `action_list` input into step records.
///
/// Only the list shape and the field types are checked here; whether each step declares
/// exactly one of `uses`/`run` is checked when identities are assigned.
pub fn parse_action_list(raw: &str) -> Result<Vec<StepSpec>, PipelineError> {
    parse_step_records(ACTION_LIST_INPUT, raw)
}

fn parse_step_records(input: &'static str, raw: &str) -> Result<Vec<StepSpec>, PipelineError> {
    parse_sequence(input, raw)?
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            if !entry.is_mapping() {
                return Err(PipelineError::invalid_shape(
                    input,
                    format!("element {index} must be a step mapping, got {}", describe(&entry)),
                ));
            }
            serde_yaml::from_value::<StepSpec>(entry)
                .map_err(|error| PipelineError::invalid_shape(input, format!("element {index}: {error}")))
        })
        .collect()
}

fn parse_sequence(input: &'static str, raw: &str) -> Result<Vec<YamlValue>, PipelineError> {
    let document: YamlValue =
        serde_yaml::from_str(raw).map_err(|error| PipelineError::invalid_shape(input, format!("invalid YAML: {error}")))?;
    match document {
        YamlValue::Sequence(entries) => Ok(entries),
        other => Err(PipelineError::invalid_shape(input, format!("got {}", describe(&other)))),
    }
}

fn describe(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a boolean",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a sequence",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}

/// Expands presets in request order, then appends the custom steps.
///
/// A preset that cannot be resolved is logged at warn level and contributes no steps.
pub fn merge(store: &dyn PresetStore, preset_names: &[String], custom_steps: Vec<StepSpec>) -> MergeOutcome {
    let mut steps = Vec::new();
    let mut skipped_presets = Vec::new();

    for name in preset_names {
        match store.resolve(name) {
            Ok(resolved) => {
                debug!(preset = %name, step_count = resolved.len(), "preset resolved");
                steps.extend(resolved);
            }
            Err(error) => {
                warn!(preset = %name, "{error}; preset skipped");
                skipped_presets.push(error);
            }
        }
    }

    debug!(custom_step_count = custom_steps.len(), "appending custom steps");
    steps.extend(custom_steps);

    MergeOutcome {
        sequence: CanonicalSequence::new(steps),
        skipped_presets,
    }
}
