//! Core executor data types.

use std::path::Path;

use crate::descriptor::Descriptor;

/// Everything an engine needs to run one descriptor.
#[derive(Debug, Clone, Copy)]
pub struct EngineRequest<'a> {
    /// Descriptor to execute.
    pub descriptor: &'a Descriptor,
    /// Runner profile, e.g. `ubuntu-latest`.
    pub runner_profile: &'a str,
    /// Workspace the engine binds as the checkout directory.
    pub workspace: &'a Path,
    /// Run-scoped directory for transient files; removed when the run ends.
    pub scratch_dir: &'a Path,
}

/// What the engine produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// Combined standard output and standard error.
    pub raw_output: Vec<u8>,
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl EngineOutput {
    pub fn new(raw_output: impl Into<Vec<u8>>, exit_code: Option<i32>) -> Self {
        Self {
            raw_output: raw_output.into(),
            exit_code,
        }
    }

    /// Whether the engine reported success (exit code 0).
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The captured output decoded lossily as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw_output).into_owned()
    }
}
