//! Fatal pipeline errors.
//!
//! Every variant here aborts the run before the engine is invoked. Conditions that
//! only degrade the output (a missing preset, an unparseable results context, a
//! non-zero engine exit) are reported through [`crate::preset::PresetError`],
//! [`crate::extract::Extraction`] and [`crate::pipeline::RunReport`] instead.

use stepline_types::StepShapeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Neither presets nor custom steps were supplied.
    #[error("at least one of 'presets' or 'action_list' inputs must be provided")]
    MissingInput,

    /// A raw input was not a well-formed ordered list of the expected records.
    #[error("input '{input}' must be a YAML sequence (list): {reason}")]
    InvalidInputShape { input: &'static str, reason: String },

    /// Inputs were supplied but nothing survived preset resolution.
    #[error("no steps found after processing presets and action_list")]
    NoSteps,

    /// A merged step declares neither or both of `uses`/`run`.
    #[error("invalid step definition at index {index}: {source}")]
    InvalidStepDefinition { index: usize, source: StepShapeError },

    /// The external engine cannot be started at all.
    #[error("engine '{binary}' is unavailable: {reason}")]
    EngineInvocationFailure { binary: String, reason: String },

    #[error("failed to render workflow descriptor: {0}")]
    Descriptor(#[from] serde_yaml::Error),

    #[error("run scratch I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn invalid_shape(input: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInputShape {
            input,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let error = PipelineError::invalid_shape("action_list", "got a mapping");
        assert_eq!(error.to_string(), "input 'action_list' must be a YAML sequence (list): got a mapping");
    }

    #[test]
    fn step_definition_errors_report_position() {
        let error = PipelineError::InvalidStepDefinition {
            index: 3,
            source: StepShapeError::MissingMode,
        };
        assert_eq!(
            error.to_string(),
            "invalid step definition at index 3: step must declare one of 'uses' or 'run'"
        );
        assert!(std::error::Error::source(&error).is_some());
    }
}
