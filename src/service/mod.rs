pub mod alert;
pub mod correlation;
pub mod dispatch;
pub mod script;

pub use correlation::CorrelationStore;
pub use dispatch::{CallDispatcher, DispatchSettings};
pub use script::VoiceScript;
