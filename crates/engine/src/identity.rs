//! Step identifier assignment.
//!
//! Identifiers are derived from a step's position and declared kind, so they are
//! unique within one run and identical across runs of the same sequence:
//!
//! - action steps: `action_{index}_{slug}` where the slug is the `uses` reference with
//!   its `@ref` suffix removed and path separators mapped to `-`
//! - script steps: `action_{index}_run`

use indexmap::IndexMap;
use stepline_types::{StepIdentity, StepKind, StepShapeError, StepSpec};
use stepline_util::{collapse_whitespace, sanitize_identifier};

use crate::error::PipelineError;
use crate::merge::CanonicalSequence;

/// Identity lookup keyed by step id, in canonical sequence order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepRegistry {
    entries: IndexMap<String, StepIdentity>,
}

impl StepRegistry {
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities in canonical sequence order.
    pub fn identities(&self) -> impl Iterator<Item = &StepIdentity> {
        self.entries.values()
    }

    /// Identity at a sequence position.
    pub fn at(&self, index: usize) -> Option<&StepIdentity> {
        self.entries.get_index(index).map(|(_, identity)| identity)
    }

    fn insert(&mut self, identity: StepIdentity) {
        self.entries.insert(identity.id.clone(), identity);
    }
}

/// Assigns an identity to every step of the sequence.
///
/// Fails with [`PipelineError::InvalidStepDefinition`] on the first step that does not
/// declare exactly one of `uses`/`run`.
pub fn assign(sequence: &CanonicalSequence) -> Result<StepRegistry, PipelineError> {
    let mut registry = StepRegistry::default();
    for (index, step) in sequence.iter().enumerate() {
        let identity = assign_identity(index, step).map_err(|source| PipelineError::InvalidStepDefinition { index, source })?;
        registry.insert(identity);
    }
    Ok(registry)
}

/// Derives the identity of the step at `index`.
pub fn assign_identity(index: usize, step: &StepSpec) -> Result<StepIdentity, StepShapeError> {
    let kind = step.kind()?;
    let explicit_name = step
        .name
        .as_deref()
        .map(collapse_whitespace)
        .filter(|name| !name.is_empty());

    let identity = match kind {
        StepKind::Uses => {
            let reference = step.uses.as_deref().unwrap_or_default().trim().to_string();
            StepIdentity {
                id: format!("action_{index}_{}", action_slug(&reference)),
                display_name: explicit_name.unwrap_or_else(|| collapse_whitespace(&format!("Run {reference}"))),
                kind,
                reference: Some(reference),
                script: None,
            }
        }
        StepKind::Run => StepIdentity {
            id: format!("action_{index}_run"),
            display_name: explicit_name.unwrap_or_else(|| format!("Run script {index}")),
            kind,
            reference: None,
            script: step.run.clone(),
        },
    };
    Ok(identity)
}

/// Turns a `uses` reference into an identifier-safe slug.
///
/// ```rust
/// use stepline_engine::identity::action_slug;
///
/// assert_eq!(action_slug("actions/checkout@v4"), "actions-checkout");
/// assert_eq!(action_slug("octo-org/repo/path/to/action@main"), "octo-org-repo-path-to-action");
/// assert_eq!(action_slug("docker://alpine:3.19"), "docker---alpine-3-19");
/// ```
pub fn action_slug(reference: &str) -> String {
    let without_ref = match reference.rsplit_once('@') {
        Some((target, _)) if !target.is_empty() => target,
        _ => reference,
    };
    sanitize_identifier(&without_ref.replace(['/', '\\'], "-"))
}
