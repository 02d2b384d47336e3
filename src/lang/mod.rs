//! Parsing of domain/problem descriptions and plan traces into the model.

pub mod parser;
pub mod plan;
mod processor;

pub use plan::{parse_plan, PlanStep};
pub use processor::task_from_strs;

#[derive(Debug, thiserror::Error)]
pub enum LangError {
    #[error("parsing failed: {0}")]
    Parse(Box<pest::error::Error<parser::Rule>>),
    #[error(transparent)]
    Model(#[from] crate::model::ModelError),
    #[error("{0}")]
    Semantic(String),
}

impl From<pest::error::Error<parser::Rule>> for LangError {
    fn from(err: pest::error::Error<parser::Rule>) -> Self {
        LangError::Parse(Box::new(err))
    }
}
