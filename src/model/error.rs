//! model errors

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unsupported model feature: {0}")]
    UnsupportedFeature(String),
    #[error("conditional effect in action {0}; only unconditional literal effects are supported")]
    ConditionalEffect(String),
    #[error("unknown action {0}")]
    UnknownAction(String),
    #[error("unknown object {0}")]
    UnknownObject(String),
    #[error("unknown type {0} declared for {1}")]
    UnknownType(String, String),
    #[error("unknown predicate {0}")]
    UnknownPredicate(String),
    #[error("predicate {0} expects {1} arguments, found {2}")]
    PredicateArity(String, usize, usize),
    #[error("unbound name {0} in action {1}")]
    UnboundName(String, String),
    #[error("duplicate definition of {0}")]
    Duplicate(String),
}
