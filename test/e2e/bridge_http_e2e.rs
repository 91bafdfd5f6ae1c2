use std::env;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use alert_call_bridge::interface::http::{self, Router};
use alert_call_bridge::service::{CallDispatcher, CorrelationStore, DispatchSettings};
use alert_call_bridge::shared::config::BridgeConfig;
use alert_call_bridge::shared::logging;
use alert_call_bridge::shared::ports::{
    AlertNotifier, CallFuture, CallPlacementPort, CallRequest, CallResult,
};

struct ServerGuard(tokio::task::JoinHandle<()>);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Queues every call and forwards the request so the test can follow the
/// callback link the provider would have fetched.
struct RecordingProvider {
    tx: mpsc::UnboundedSender<CallRequest>,
}

impl CallPlacementPort for RecordingProvider {
    fn place_call(&self, request: CallRequest) -> CallFuture {
        let _ = self.tx.send(request.clone());
        Box::pin(async move {
            Ok(CallResult {
                status: "queued".to_string(),
                provider_call_id: Some("CA00000000000000000000000000000001".to_string()),
                raw: json!({ "status": "queued", "to": request.to }),
            })
        })
    }
}

fn bridge_config(endpoint: &str) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let yaml = format!(
        r#"
external_endpoint: "{endpoint}"
http:
  enabled: true
  listen: "127.0.0.1:0"
webhooks:
  call:
    enabled: true
  alert:
    enabled: true
    username: grafana
    password: s3cret
    pre_message: "Attention"
  provider:
    enabled: true
    voice: alice
    from: "+15559999"
    notify: ["+15550001", "+15550002"]
"#
    );
    Ok(BridgeConfig::from_yaml_str(&yaml)?)
}

fn build_router(cfg: &BridgeConfig) -> (Router, mpsc::UnboundedReceiver<CallRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let store = CorrelationStore::without_expiry();
    let port: Arc<dyn CallPlacementPort> = Arc::new(RecordingProvider { tx });
    let dispatcher = CallDispatcher::new(store.clone(), port, DispatchSettings::from_config(cfg));
    let notifier: Arc<dyn AlertNotifier> = Arc::new(dispatcher);
    (Router::from_config(cfg, store, notifier), rx)
}

async fn next_call(
    rx: &mut mpsc::UnboundedReceiver<CallRequest>,
) -> Result<CallRequest, Box<dyn std::error::Error>> {
    let call = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await?
        .ok_or("provider channel closed")?;
    Ok(call)
}

fn init_logging() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    logging::init();
}

#[tokio::test]
async fn alert_to_callback_roundtrip_over_http() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let base_url = format!("http://{}", addr);
    let cfg = bridge_config(&base_url)?;
    let (router, mut calls) = build_router(&cfg);
    let _guard = ServerGuard(http::spawn_http_server(listener, router));
    let client = reqwest::Client::new();
    let alert_url = format!("{}/webhook/alert/", base_url);

    let alert = json!({
        "ruleName": "High CPU",
        "state": "alerting",
        "title": "[Alerting] CPU",
        "message": "CPU above 90% on web-1",
        "evalMatches": [{ "value": 93.5, "metric": "cpu", "tags": null }]
    });

    let res = client.post(&alert_url).json(&alert).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        res.headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok()),
        Some("Basic realm=Restricted")
    );

    let res = client
        .post(&alert_url)
        .basic_auth("grafana", Some("s3cret"))
        .body("{not json")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client.get(&alert_url).send().await?;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    let res = client
        .post(&alert_url)
        .basic_auth("grafana", Some("s3cret"))
        .json(&alert)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let first = next_call(&mut calls).await?;
    let second = next_call(&mut calls).await?;
    assert_eq!(first.to, "+15550001");
    assert_eq!(second.to, "+15550002");
    assert_eq!(first.from, "+15559999");
    let prefix = format!("{}/webhook/provider/", base_url);
    assert!(first.callback_url.starts_with(&prefix));
    assert!(first.callback_url.ends_with(".xml"));
    assert_ne!(first.callback_url, second.callback_url);

    let res = client.post(&first.callback_url).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/xml")
    );
    let script = res.text().await?;
    assert!(script.contains("<Response>"));
    assert!(script.contains(r#"<Say voice="alice">Attention</Say>"#));
    assert!(script.contains(r#"<Say voice="alice">[Alerting] CPU</Say>"#));
    assert!(script.contains(r#"<Say voice="alice">CPU above 90% on web-1</Say>"#));

    let res = client.post(&first.callback_url).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(&second.callback_url).send().await?;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    let res = client.post(&second.callback_url).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/webhook/provider/bad-id!.xml", base_url))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client.get(format!("{}/nowhere", base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_call_over_self_signed_https() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let base_url = format!("https://{}", addr);
    let mut cfg = bridge_config(&base_url)?;
    cfg.https.enabled = true;
    cfg.https.listen = addr.to_string();
    let acceptor = http::build_tls_acceptor(&cfg.https)?;
    let (router, mut calls) = build_router(&cfg);
    let _guard = ServerGuard(http::spawn_https_server(listener, acceptor, router));
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()?;

    let res = client.get(format!("{}/call/", base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let call = next_call(&mut calls).await?;
    let res = client.post(&call.callback_url).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let script = res.text().await?;
    assert!(script.contains("Testing bridge from alerting to G S M call"));

    Ok(())
}
