use thiserror::Error;

/// Hard failures of the pipeline. Category and driver mismatches are not
/// errors; they travel as notices next to the result (see [`crate::notice`]).
#[derive(Error, Debug)]
pub enum Error {
    /// A lap table is present but one of its columns cannot be interpreted.
    #[error("data format error: {0}")]
    DataFormat(String),
    /// An identifying column is absent. Callers skip the session.
    #[error("missing required column: {column}")]
    MissingColumn { column: &'static str },
    #[error("insufficient data for {what}: need at least {needed} rows, got {got}")]
    InsufficientData {
        what: &'static str,
        needed: usize,
        got: usize,
    },
    #[error("training failed: {0}")]
    Training(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("model artifact version {found} is not supported (expected {expected})")]
    IncompatibleArtifact { found: u32, expected: u32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Errors that only invalidate the session being processed, not the run.
    pub fn is_session_local(&self) -> bool {
        matches!(self, Error::DataFormat(_) | Error::MissingColumn { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
