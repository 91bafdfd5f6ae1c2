use std::time::Duration;

use thiserror::Error;

/// Failure of a single outbound call placement. Scoped to one recipient;
/// dispatch logs it and moves on to the next one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderCallError {
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("call placement timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider rejected the call ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("call did not hit the queue, status={status}")]
    NotQueued { status: String },
}
