use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::shared::error::ProviderCallError;

pub type CallFuture = Pin<Box<dyn Future<Output = Result<CallResult, ProviderCallError>> + Send>>;

/// One outbound call placement. Built per recipient and dropped once the
/// provider answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: String,
    pub from: String,
    pub callback_url: String,
}

/// What the provider said about a placement. Only used to pick a log level
/// and to count successes.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub status: String,
    pub provider_call_id: Option<String>,
    pub raw: Value,
}

impl CallResult {
    pub fn is_queued(&self) -> bool {
        self.status.eq_ignore_ascii_case("queued")
    }
}

pub trait CallPlacementPort: Send + Sync {
    fn place_call(&self, request: CallRequest) -> CallFuture;
}
