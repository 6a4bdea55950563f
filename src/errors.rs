/// Error types for the batch pricing pipeline.
///
/// Row-level validation failures are never represented here: they travel as
/// strings on the individual result records. These variants cover the two
/// remaining tiers:
/// - chunk faults (`Engine`, `ChunkFailed`), caught at the chunk boundary and
///   downgraded to failed rows for that chunk only
/// - request faults (`Config`, `Parse`, `Io`, `MissingColumns`, `Timeout`),
///   returned to the caller
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("pricing engine error: {0}")]
    Engine(String),

    #[error("chunk at offset {offset} failed: {reason}")]
    ChunkFailed { offset: usize, reason: String },

    #[error("batch did not complete within {0:?}")]
    Timeout(std::time::Duration),
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
