pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // sub-categories of errors
    #[error(transparent)]
    Model(#[from] crate::model::ModelError),
    #[error(transparent)]
    Lang(#[from] crate::lang::LangError),
    #[error(transparent)]
    Diagnosis(#[from] crate::diagnosis::DiagnosisError),

    // Wrappers on top of other errors
    #[error("std::io::Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow::Error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diagnosis::DiagnosisError, model::ModelError};

    fn fails_with_model_error() -> Result<()> {
        Err(ModelError::UnknownAction("warp".to_string()))?
    }

    #[test]
    fn module_errors_convert_into_the_crate_error() {
        assert!(matches!(fails_with_model_error(), Err(Error::Model(_))));
        let err: Error = DiagnosisError::NoTraces.into();
        assert!(matches!(err, Error::Diagnosis(DiagnosisError::NoTraces)));
        assert_eq!(err.to_string(), "no trace systems to diagnose");
    }
}
