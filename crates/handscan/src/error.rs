//! Error types for the measurement engine.
//!
//! Failures are split the way users experience them: a [`SessionError`] means
//! an operation was not attempted (a precondition did not hold), a
//! [`SourceError`] means a landmark/coin backend ran and produced nothing
//! usable. Neither ever overwrites committed state. "Nothing found" outcomes
//! such as an undetected coin are not errors at all; see
//! [`crate::CoinOutcome`].

use thiserror::Error;

/// Preconditions checked before an operation starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Upload an image first.")]
    NoImage,

    #[error("Enter a cloud endpoint first.")]
    NoEndpoint,

    #[error("Cloud endpoint is invalid.")]
    InvalidEndpoint,

    #[error("Coin diameter must be a positive number.")]
    InvalidDiameter,

    /// Another acquisition is still in flight.
    #[error("{0} is already running.")]
    Busy(&'static str),

    /// A click arrived while no manual entry was in progress.
    #[error("No manual entry in progress.")]
    NotAwaitingInput,

    /// Completion of an acquisition started before the image was replaced.
    #[error("Result discarded: the image changed while it was running.")]
    StaleTicket,
}

/// Failures reported by landmark sources and detection backends.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The backend is not loaded/configured; the operation was not attempted.
    #[error("{0}")]
    Unavailable(String),

    /// The backend already has a request outstanding.
    #[error("{0} is busy with another request.")]
    Busy(&'static str),

    #[error("No hand detected.")]
    NoHand,

    #[error("Model returned no landmarks.")]
    NoPrediction,

    /// Some keypoints missing or invalid.
    #[error("{0}")]
    Incomplete(String),

    #[error("Cloud request failed ({status}).")]
    Status { status: u16 },

    #[error("Cloud response is not valid JSON")]
    MalformedResponse(#[source] serde_json::Error),

    #[error("Failed to encode the image.")]
    Encode(#[source] image::ImageError),

    #[error("Cloud inference failed.")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A predictor threw while running.
    #[error("Model inference failed.")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{0} timed out after {1} ms.")]
    Timeout(&'static str, u64),
}

impl SourceError {
    /// Whether a configured fallback may take over after this failure.
    ///
    /// `Busy` is excluded: the original request is still running and will
    /// commit on its own.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, SourceError::Busy(_))
    }

    pub(crate) fn incomplete(what: &str) -> Self {
        SourceError::Incomplete(format!("{what} incomplete or invalid."))
    }
}

/// Failure of an orchestrated acquisition: either it was never attempted or
/// its source produced nothing usable.
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Configuration loading/validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
