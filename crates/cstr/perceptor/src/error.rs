use thiserror::Error;

/// Errors raised by the risk perceptor and its classifier.
#[derive(Error, Debug)]
pub enum PerceptorError {
    #[error("failed to read classifier artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed classifier artifact: {0}")]
    Artifact(#[from] serde_json::Error),

    #[error("invalid classifier: {0}")]
    InvalidModel(String),

    #[error("classifier inference failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Types(#[from] cstr_types::TypesError),
}

pub type PerceptorResult<T> = Result<T, PerceptorError>;
