use std::fmt;

use rand::Rng;
use thiserror::Error;

/// Symbols a correlation id is drawn from: ASCII letters in both cases plus digits.
pub const CORRELATION_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 16 symbols of a 62-symbol alphabet, about 95 bits per id.
pub const CORRELATION_ID_LEN: usize = 16;

/// Longest id accepted from an inbound callback path.
pub const CORRELATION_ID_MAX_LEN: usize = 64;

/// Opaque token pairing a dispatched voice script with the provider callback
/// that later fetches it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelationIdError {
    #[error("correlation id is empty")]
    Empty,
    #[error("correlation id is longer than 64 characters")]
    TooLong,
    #[error("correlation id contains a non-alphanumeric character")]
    InvalidCharacter,
}

impl CorrelationId {
    /// Draws a fresh random id. Uniqueness among live records is the store's job.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id: String = (0..CORRELATION_ID_LEN)
            .map(|_| CORRELATION_ALPHABET[rng.gen_range(0..CORRELATION_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Validates an id received from outside, e.g. a callback path segment.
    pub fn parse(value: &str) -> Result<Self, CorrelationIdError> {
        if value.is_empty() {
            return Err(CorrelationIdError::Empty);
        }
        if value.len() > CORRELATION_ID_MAX_LEN {
            return Err(CorrelationIdError::TooLong);
        }
        if !value.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(CorrelationIdError::InvalidCharacter);
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
