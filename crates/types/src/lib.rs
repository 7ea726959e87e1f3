//! Shared type definitions for the step-list compiler.
//!
//! The types in this crate describe the same unit of work at the three points where
//! it changes shape: the step a caller asks for ([`StepSpec`]), the identity the
//! compiler assigns to it ([`StepIdentity`]), and the record reported back once the
//! external engine has run it ([`NormalizedStepResult`]).

pub mod result;
pub mod workflow;

pub use result::{NormalizedStepResult, StepOutcome};
pub use workflow::{StepIdentity, StepKind, StepShapeError, StepSpec};
