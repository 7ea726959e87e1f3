//! Engine invocation.
//!
//! - `types` holds the request handed to an engine and the output it returns
//! - `runner::Engine` abstracts how a descriptor is executed
//! - `runner::ActEngine` shells out to the `act` local workflow runner

pub mod runner;
pub mod types;

pub use runner::{ActEngine, DEFAULT_CONTAINER_ARCHITECTURE, DEFAULT_ENGINE_BINARY, DESCRIPTOR_FILE_NAME, Engine};
pub use types::{EngineOutput, EngineRequest};
