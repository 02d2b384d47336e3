//! Model-based diagnosis of action schemas against execution traces.

pub mod component;
pub mod driver;
pub mod system;

pub use component::{Component, ComponentKind};
pub use driver::{ComponentWeights, Diagnoser, DiagnoserConfig};
pub use system::{Candidate, Conflict, System, TraceSystem, Violation, Witness};

use crate::model::{Literal, ModelError};

#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("step {step} ({action}): expected {expected} arguments, found {found}")]
    ArgumentCount {
        step: usize,
        action: String,
        expected: usize,
        found: usize,
    },
    #[error(
        "step {step} ({action}): object {object} of type {found} cannot bind \
         parameter {param} of type {expected}"
    )]
    ParameterBinding {
        step: usize,
        action: String,
        object: String,
        found: String,
        param: String,
        expected: String,
    },
    #[error("no trace systems to diagnose")]
    NoTraces,
    #[error("violation of {atom} at step {step} admits no repair")]
    Unrepairable { atom: Literal, step: usize },
    #[error("hitting-set search exhausted without a diagnosis")]
    SearchExhausted,
    #[error(transparent)]
    Model(#[from] ModelError),
}
