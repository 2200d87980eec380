use std::time::Duration;

use thiserror::Error;

/// Failure of a single request attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("backend returned status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
}

/// A logical request that failed on every attempt it was allowed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{label} failed after {attempts} attempt(s): {last}")]
pub struct RetryError {
    pub label: &'static str,
    pub attempts: u32,
    #[source]
    pub last: RequestError,
}

/// The camera could not be opened. Terminal for this start attempt only.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AcquisitionError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera access denied: {0}")]
    Denied(String),
}

/// Frame delivery exhausted its retries; the session is ended unsaved.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("frame delivery failed: {0}")]
pub struct DeliveryError(#[from] pub RetryError);

/// The stop-and-save call failed. Local teardown has already happened.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("saving the session failed: {0}")]
pub struct PersistenceError(#[from] pub RetryError);

/// History input that cannot be charted. Callers degrade to "no data".
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregationInputError {
    #[error("history is empty")]
    Empty,
    #[error("history payload is malformed: {0}")]
    Malformed(String),
    #[error("history could not be fetched: {0}")]
    Unavailable(#[from] RetryError),
}

/// Errors returned by the session controller's public operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("a detection session is already running")]
    AlreadyRunning,
    #[error("session start was cancelled while the camera was opening")]
    Cancelled,
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}
