use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use alert_call_bridge::interface::http::{self, Router};
use alert_call_bridge::interface::provider::TwilioAdapter;
use alert_call_bridge::service::{CallDispatcher, CorrelationStore, DispatchSettings};
use alert_call_bridge::shared::config::{self, BridgeConfig, ProviderCredentials};
use alert_call_bridge::shared::logging;
use alert_call_bridge::shared::ports::{AlertNotifier, CallPlacementPort};

/// Loads configuration, binds the enabled listeners and serves until Ctrl-C.
///
/// Any startup problem (missing credentials, unreadable config, a listener
/// that cannot bind) is logged and returned, so the process exits non-zero.
#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    match run().await {
        Ok(()) => Ok(()),
        Err(err) => {
            log::error!("[main] startup failed: {:#}", err);
            Err(err)
        }
    }
}

async fn run() -> Result<()> {
    let credentials = ProviderCredentials::from_env()?;
    let path = config::config_path();
    let cfg = BridgeConfig::load(&path)?;
    cfg.validate()?;
    log::info!("[main] configuration loaded from {}", path.display());

    let store = CorrelationStore::new(cfg.correlation.ttl());
    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    if let Some(sweeper) = store.spawn_sweeper(cfg.correlation.sweep_interval()) {
        handles.push(sweeper);
    }

    let adapter = TwilioAdapter::new(
        &cfg.provider.api_base,
        credentials,
        cfg.provider.call_timeout(),
    )
    .context("build provider http client")?;
    log::info!("[main] provider calls endpoint {}", adapter.calls_url());
    let port: Arc<dyn CallPlacementPort> = Arc::new(adapter);
    let dispatcher = CallDispatcher::new(store.clone(), port, DispatchSettings::from_config(&cfg));
    let notifier: Arc<dyn AlertNotifier> = Arc::new(dispatcher);
    let router = Router::from_config(&cfg, store, notifier);

    if cfg.http.enabled {
        let listener = TcpListener::bind(cfg.http.listen.as_str())
            .await
            .with_context(|| format!("bind http listener {}", cfg.http.listen))?;
        log::info!("[main] http listening on {}", cfg.http.listen);
        handles.push(http::spawn_http_server(listener, router.clone()));
    }
    if cfg.https.enabled {
        let acceptor = http::build_tls_acceptor(&cfg.https)?;
        let listener = TcpListener::bind(cfg.https.listen.as_str())
            .await
            .with_context(|| format!("bind https listener {}", cfg.https.listen))?;
        log::info!("[main] https listening on {}", cfg.https.listen);
        handles.push(http::spawn_https_server(listener, acceptor, router.clone()));
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("[main] shutdown signal error: {:?}", err);
    }
    log::info!("[main] shutting down");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}
