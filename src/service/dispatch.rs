//! Call dispatch: one correlation record and one outbound call per recipient.
//!
//! Placement requests are serialized process-wide through a single mutex that
//! every dispatcher clone shares. The lock is held only around the provider
//! call, and that call is bounded by a timeout so a hanging provider cannot
//! stall everyone else.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::service::correlation::CorrelationStore;
use crate::service::script;
use crate::shared::config::BridgeConfig;
use crate::shared::entities::CorrelationId;
use crate::shared::error::ProviderCallError;
use crate::shared::ports::{
    AlertNotifier, CallPlacementPort, CallRequest, CallResult, DispatchFuture, DispatchSummary,
};
use crate::shared::utils::mask_phone;

pub const CALLBACK_PATH_PREFIX: &str = "/webhook/provider/";
pub const CALLBACK_SUFFIX: &str = ".xml";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub callback_base: String,
    pub from: String,
    pub recipients: Vec<String>,
    pub voice: String,
    pub call_timeout: Duration,
}

impl DispatchSettings {
    pub fn from_config(cfg: &BridgeConfig) -> Self {
        let provider = &cfg.webhooks.provider;
        Self {
            callback_base: cfg.callback_base(),
            from: provider.from.clone(),
            recipients: provider.notify.clone(),
            voice: provider.voice.clone(),
            call_timeout: cfg.provider.call_timeout(),
        }
    }
}

pub fn callback_url(base: &str, id: &CorrelationId) -> String {
    format!(
        "{}{}{}{}",
        base.trim_end_matches('/'),
        CALLBACK_PATH_PREFIX,
        id,
        CALLBACK_SUFFIX
    )
}

#[derive(Clone)]
pub struct CallDispatcher {
    store: CorrelationStore,
    port: Arc<dyn CallPlacementPort>,
    settings: Arc<DispatchSettings>,
    call_lock: Arc<Mutex<()>>,
}

impl CallDispatcher {
    pub fn new(
        store: CorrelationStore,
        port: Arc<dyn CallPlacementPort>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            port,
            settings: Arc::new(settings),
            call_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Shares an existing placement lock, for when several dispatchers run in
    /// one process.
    pub fn with_call_lock(mut self, call_lock: Arc<Mutex<()>>) -> Self {
        self.call_lock = call_lock;
        self
    }

    pub fn call_lock(&self) -> Arc<Mutex<()>> {
        self.call_lock.clone()
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Renders the script and calls every recipient in order. A failure for one
    /// recipient is logged and the loop goes on; nothing is returned as an error.
    pub async fn notify<S: AsRef<str>>(&self, lines: &[S], voice: &str) -> DispatchSummary {
        let script = script::generate_xml(lines, voice);
        let mut summary = DispatchSummary::default();
        for to in &self.settings.recipients {
            summary.attempted += 1;
            match self.dispatch_one(to, &script).await {
                Ok(_) => summary.queued += 1,
                Err(_) => summary.failed += 1,
            }
        }
        log::info!(
            "[dispatch] round finished attempted={} queued={} failed={}",
            summary.attempted,
            summary.queued,
            summary.failed
        );
        summary
    }

    async fn dispatch_one(&self, to: &str, script: &[u8]) -> Result<CallResult, ProviderCallError> {
        let id = self.store.put(script.to_vec());
        let url = callback_url(&self.settings.callback_base, &id);
        log::debug!(
            "[dispatch] putting the call in queue id={} to={} url={} script={}",
            id,
            mask_phone(to),
            url,
            String::from_utf8_lossy(script)
        );

        let request = CallRequest {
            to: to.to_string(),
            from: self.settings.from.clone(),
            callback_url: url,
        };
        match self.place_serialized(request).await {
            Ok(result) if result.is_queued() => {
                log::info!(
                    "[dispatch] the call is queued id={} to={} call_sid={}",
                    id,
                    mask_phone(to),
                    result.provider_call_id.as_deref().unwrap_or("-")
                );
                Ok(result)
            }
            Ok(result) => {
                log::error!(
                    "[dispatch] the call did not hit the queue id={} to={} status={} resp={}",
                    id,
                    mask_phone(to),
                    result.status,
                    result.raw
                );
                Err(ProviderCallError::NotQueued {
                    status: result.status,
                })
            }
            Err(err) => {
                if matches!(err, ProviderCallError::Rejected { .. }) {
                    self.store.take(&id);
                }
                log::error!(
                    "[dispatch] call placement failed id={} to={}: {}",
                    id,
                    mask_phone(to),
                    err
                );
                Err(err)
            }
        }
    }

    async fn place_serialized(&self, request: CallRequest) -> Result<CallResult, ProviderCallError> {
        let _guard = self.call_lock.lock().await;
        let timeout = self.settings.call_timeout;
        match tokio::time::timeout(timeout, self.port.place_call(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderCallError::Timeout(timeout)),
        }
    }
}

impl AlertNotifier for CallDispatcher {
    fn notify_lines(&self, lines: Vec<String>) -> DispatchFuture {
        let dispatcher = self.clone();
        Box::pin(async move {
            let voice = dispatcher.settings.voice.clone();
            dispatcher.notify(&lines, &voice).await
        })
    }
}

/// Starts a dispatch round nobody waits for. A panic inside the round is
/// caught by a watcher task and logged.
pub fn spawn_detached(
    notifier: Arc<dyn AlertNotifier>,
    lines: Vec<String>,
    origin: &'static str,
) -> JoinHandle<()> {
    let round = tokio::spawn(notifier.notify_lines(lines));
    tokio::spawn(async move {
        match round.await {
            Ok(summary) => log::debug!(
                "[dispatch] detached round from {} done queued={}/{}",
                origin,
                summary.queued,
                summary.attempted
            ),
            Err(err) => log::error!("[dispatch] detached round from {} failed: {}", origin, err),
        }
    })
}
