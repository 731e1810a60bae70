use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON input: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to encode or decode binary payload: {0}")]
    EncodingError(#[from] bincode::Error),

    #[error("Failed to write CSV output: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid runtime configuration: {0}")]
    ConfigError(String),

    /// An end event arrived for an entity whose owner was never recorded.
    #[error("No owner recorded for {entity} {id}")]
    UnresolvedOwner { entity: &'static str, id: u64 },

    #[error("Job {0} is already pending")]
    DuplicateJob(u64),

    #[error("Job {0} was already finalized")]
    JobAlreadyFinalized(u64),

    #[error("Head requested on an empty stream")]
    EmptySequence,

    #[error("Failed to spill segment {segment} to disk: {reason}")]
    SpillFailure { segment: u64, reason: String },

    #[error("Failed to restore segment {segment} from disk: {reason}")]
    RestoreFailure { segment: u64, reason: String },

    #[error("Worker pool is no longer accepting jobs")]
    PoolClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
