use thiserror::Error;

/// Convenience result type for wrangling operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Error type returned across loading, transformation, gating and subsampling.
///
/// This is a single error enum shared by every module in the crate.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV event-table loading error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Metadata sidecar parsing error.
    #[error("metadata sidecar error: {0}")]
    Json(#[from] serde_json::Error),

    /// The operation's preconditions do not hold for the given data
    /// (e.g. channels with incompatible declared ranges).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A caller-supplied argument is outside its documented domain.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// An index or count exceeds the number of available events.
    #[error("out of bounds: requested {requested} but only {available} events available ({context})")]
    OutOfBounds {
        requested: usize,
        available: usize,
        context: String,
    },

    /// A requested metadata field is absent.
    #[error("metadata field '{field}' not found in {origin}")]
    MissingMetadata { field: String, origin: String },

    /// A value could not be parsed into an event reading.
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// A named channel does not exist in the event table.
    #[error("unknown channel '{channel}'")]
    UnknownChannel { channel: String },
}

impl FlowError {
    /// Shorthand for a [`FlowError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`FlowError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
