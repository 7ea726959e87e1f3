//! End-to-end run orchestration.
//!
//! Stages run strictly in order and hand their products forward as values:
//! parse, merge, assign identities, check the engine, render the descriptor, invoke
//! the engine, extract results. Every fatal condition surfaces before the engine is
//! invoked. Transient files live in a run-scoped scratch directory that is removed
//! when the run returns, on success and on error alike.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use stepline_types::NormalizedStepResult;
use tracing::{debug, info, warn};

use crate::descriptor::{self, Descriptor, DescriptorOptions};
use crate::error::PipelineError;
use crate::executor::{Engine, EngineRequest};
use crate::extract::{RawEngineResult, extract};
use crate::identity::{self, StepRegistry};
use crate::merge::{self, CanonicalSequence};
use crate::preset::{PresetError, PresetStore};

/// File the trailer step writes the engine's step context to, inside the scratch directory.
pub const RESULTS_FILE_NAME: &str = "results.json";
/// Default runner profile.
pub const DEFAULT_RUNNER_OS: &str = "ubuntu-latest";

/// Raw inputs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// YAML sequence of preset names.
    pub presets: Option<String>,
    /// YAML sequence of step records.
    pub action_list: Option<String>,
    pub runner_os: String,
    pub workspace: PathBuf,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            presets: None,
            action_list: None,
            runner_os: DEFAULT_RUNNER_OS.to_string(),
            workspace: PathBuf::from("."),
        }
    }
}

impl RunRequest {
    /// Sets the presets input; blank text counts as not provided.
    pub fn with_presets(mut self, raw: impl Into<String>) -> Self {
        self.presets = non_blank(raw.into());
        self
    }

    /// Sets the custom step input; blank text counts as not provided.
    pub fn with_action_list(mut self, raw: impl Into<String>) -> Self {
        self.action_list = non_blank(raw.into());
        self
    }

    pub fn with_runner_os(mut self, runner_os: impl Into<String>) -> Self {
        self.runner_os = runner_os.into();
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }
}

fn non_blank(raw: String) -> Option<String> {
    if raw.trim().is_empty() { None } else { Some(raw) }
}

/// Merged and identified steps, ready to be rendered.
#[derive(Debug, Clone)]
pub struct CompiledRun {
    pub sequence: CanonicalSequence,
    pub registry: StepRegistry,
    pub skipped_presets: Vec<PresetError>,
}

impl CompiledRun {
    /// Renders the descriptor whose trailer writes the step context to `results_path`.
    pub fn descriptor(&self, runner_os: &str, results_path: &Path) -> Result<Descriptor, PipelineError> {
        descriptor::generate(
            &self.sequence,
            &self.registry,
            &DescriptorOptions {
                runner_os,
                results_path,
            },
        )
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// One record per registered step, then the trailer record; empty when degraded.
    pub results: Vec<NormalizedStepResult>,
    /// Engine exit code; non-zero means an embedded step failed.
    pub engine_exit_code: Option<i32>,
    /// Why results could not be fully recovered, if they could not.
    pub degraded_reason: Option<String>,
    pub skipped_presets: Vec<PresetError>,
}

impl RunReport {
    pub fn engine_succeeded(&self) -> bool {
        self.engine_exit_code == Some(0)
    }
}

/// The compiler pipeline, wired to a preset store and an engine.
pub struct Pipeline<'a> {
    presets: &'a dyn PresetStore,
    engine: &'a dyn Engine,
}

impl<'a> Pipeline<'a> {
    pub fn new(presets: &'a dyn PresetStore, engine: &'a dyn Engine) -> Self {
        Self { presets, engine }
    }

    /// Parses, merges and identifies the requested steps without touching the engine.
    pub fn compile(&self, request: &RunRequest) -> Result<CompiledRun, PipelineError> {
        if request.presets.is_none() && request.action_list.is_none() {
            return Err(PipelineError::MissingInput);
        }

        let preset_names = match &request.presets {
            Some(raw) => merge::parse_preset_names(raw)?,
            None => Vec::new(),
        };
        let custom_steps = match &request.action_list {
            Some(raw) => merge::parse_action_list(raw)?,
            None => Vec::new(),
        };
        debug!(
            preset_count = preset_names.len(),
            custom_step_count = custom_steps.len(),
            "inputs parsed"
        );
        if preset_names.is_empty() && custom_steps.is_empty() {
            return Err(PipelineError::MissingInput);
        }

        let outcome = merge::merge(self.presets, &preset_names, custom_steps);
        if outcome.sequence.is_empty() {
            return Err(PipelineError::NoSteps);
        }
        let registry = identity::assign(&outcome.sequence)?;
        info!(
            step_count = outcome.sequence.len(),
            skipped_presets = outcome.skipped_presets.len(),
            "step list compiled"
        );

        Ok(CompiledRun {
            sequence: outcome.sequence,
            registry,
            skipped_presets: outcome.skipped_presets,
        })
    }

    /// Renders the descriptor a run would execute, without invoking the engine.
    pub fn preview(&self, request: &RunRequest) -> Result<Descriptor, PipelineError> {
        let compiled = self.compile(request)?;
        compiled.descriptor(&request.runner_os, Path::new(RESULTS_FILE_NAME))
    }

    /// Compiles the request, runs it through the engine, and normalizes the results.
    pub fn run(&self, request: &RunRequest) -> Result<RunReport, PipelineError> {
        let compiled = self.compile(request)?;
        self.engine.ensure_available()?;

        let scratch = tempfile::Builder::new().prefix("stepline-").tempdir()?;
        let results_path = scratch.path().join(RESULTS_FILE_NAME);
        let descriptor = compiled.descriptor(&request.runner_os, &results_path)?;

        let output = self.engine.run(&EngineRequest {
            descriptor: &descriptor,
            runner_profile: &request.runner_os,
            workspace: &request.workspace,
            scratch_dir: scratch.path(),
        })?;
        if !output.succeeded() {
            warn!(exit_code = ?output.exit_code, "engine reported a failure; recovering partial results");
        }

        let context = read_context(&results_path);
        let extraction = extract(
            &RawEngineResult {
                output: &output.raw_output,
                context: context.as_deref(),
            },
            &compiled.registry,
        );
        let degraded_reason = extraction.degraded_reason().map(str::to_string);
        if let Some(reason) = &degraded_reason {
            warn!(%reason, "step results could not be fully recovered");
        }
        let results = extraction.into_results();
        info!(result_count = results.len(), exit_code = ?output.exit_code, "run finished");

        Ok(RunReport {
            results,
            engine_exit_code: output.exit_code,
            degraded_reason,
            skipped_presets: compiled.skipped_presets,
        })
    }
}

fn read_context(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "results context was not written");
            None
        }
        Err(error) => {
            warn!(path = %path.display(), "failed to read results context: {error}");
            None
        }
    }
}
