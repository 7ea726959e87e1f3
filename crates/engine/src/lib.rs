//! # Stepline Engine
//!
//! Compiles a requested list of CI steps (named presets plus inline custom steps) into
//! a single-job workflow descriptor, runs it through an external local workflow
//! engine, and turns whatever the engine left behind into one normalized result record
//! per step.
//!
//! ## Usage
//!
//! ```rust
//! use stepline_engine::{InMemoryPresetStore, Pipeline, RunRequest, StepSpec};
//! # use stepline_engine::{Engine, EngineOutput, EngineRequest, PipelineError};
//! # struct NeverRuns;
//! # impl Engine for NeverRuns {
//! #     fn ensure_available(&self) -> Result<(), PipelineError> { Ok(()) }
//! #     fn run(&self, _: &EngineRequest<'_>) -> Result<EngineOutput, PipelineError> { unreachable!() }
//! # }
//!
//! let presets = InMemoryPresetStore::new().with_preset("checkout", vec![StepSpec::action("actions/checkout@v4")]);
//! let engine = NeverRuns;
//! let pipeline = Pipeline::new(&presets, &engine);
//!
//! let request = RunRequest::default()
//!     .with_presets("[checkout]")
//!     .with_action_list("- name: Echo\n  run: echo hi\n");
//! let descriptor = pipeline.preview(&request)?;
//! assert!(descriptor.text().contains("action_0_actions-checkout"));
//! assert!(descriptor.text().contains("action_1_run"));
//! # Ok::<(), PipelineError>(())
//! ```
//!
//! ## Architecture
//!
//! - **`preset`**: named, reusable step lists
//! - **`merge`**: input parsing and the canonical step sequence
//! - **`identity`**: deterministic step ids and display names
//! - **`descriptor`**: workflow document rendering, including the result-collecting trailer step
//! - **`executor`**: the `Engine` seam and its `act` implementation
//! - **`extract`**: pluggable strategies that normalize engine output
//! - **`pipeline`**: ties the stages together for one run

pub mod descriptor;
pub mod error;
pub mod executor;
pub mod extract;
pub mod identity;
pub mod merge;
pub mod pipeline;
pub mod preset;

pub use descriptor::{Descriptor, TRAILER_STEP_ID};
pub use error::PipelineError;
pub use executor::{ActEngine, Engine, EngineOutput, EngineRequest};
pub use extract::{Extraction, ExtractionStrategy, RawEngineResult, extract, extract_with};
pub use identity::StepRegistry;
pub use merge::CanonicalSequence;
pub use pipeline::{CompiledRun, Pipeline, RESULTS_FILE_NAME, RunReport, RunRequest};
pub use preset::{DirectoryPresetStore, InMemoryPresetStore, PresetError, PresetStore};
pub use stepline_types::{NormalizedStepResult, StepOutcome, StepSpec};
