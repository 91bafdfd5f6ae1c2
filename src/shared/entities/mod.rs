pub mod identifiers;

pub use identifiers::{CorrelationId, CorrelationIdError};
