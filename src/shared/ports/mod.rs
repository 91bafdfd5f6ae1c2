pub mod call_provider;
pub mod notifier;

pub use call_provider::{CallFuture, CallPlacementPort, CallRequest, CallResult};
pub use notifier::{AlertNotifier, DispatchFuture, DispatchSummary};
