use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric {0} is already registered")]
    DuplicateName(String),

    #[error("metric {name} expects labels {expected:?}, got {got:?}")]
    LabelMismatch {
        name: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("metrics output is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
