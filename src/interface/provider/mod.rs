//! Twilio-compatible REST adapter for placing outbound calls.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::shared::config::ProviderCredentials;
use crate::shared::error::ProviderCallError;
use crate::shared::ports::{CallFuture, CallPlacementPort, CallRequest, CallResult};

#[derive(Clone)]
pub struct TwilioAdapter {
    client: Client,
    calls_url: String,
    credentials: ProviderCredentials,
    timeout: Duration,
}

impl TwilioAdapter {
    pub fn new(
        api_base: &str,
        credentials: ProviderCredentials,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let calls_url = calls_url(api_base, &credentials.account_sid);
        Ok(Self {
            client,
            calls_url,
            credentials,
            timeout,
        })
    }

    pub fn calls_url(&self) -> &str {
        &self.calls_url
    }
}

fn calls_url(api_base: &str, account_sid: &str) -> String {
    format!(
        "{}/2010-04-01/Accounts/{}/Calls.json",
        api_base.trim_end_matches('/'),
        account_sid
    )
}

impl CallPlacementPort for TwilioAdapter {
    fn place_call(&self, request: CallRequest) -> CallFuture {
        let client = self.client.clone();
        let url = self.calls_url.clone();
        let credentials = self.credentials.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            let params = [
                ("Url", request.callback_url.as_str()),
                ("From", request.from.as_str()),
                ("To", request.to.as_str()),
            ];
            let resp = client
                .post(&url)
                .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
                .form(&params)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ProviderCallError::Timeout(timeout)
                    } else {
                        ProviderCallError::Transport(e.to_string())
                    }
                })?;

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| ProviderCallError::Transport(e.to_string()))?;
            if !status.is_success() {
                return Err(ProviderCallError::Rejected {
                    status: status.as_u16(),
                    message: error_message(&body),
                });
            }
            parse_call_response(&body)
        })
    }
}

fn parse_call_response(body: &str) -> Result<CallResult, ProviderCallError> {
    let raw: Value = serde_json::from_str(body)
        .map_err(|e| ProviderCallError::InvalidResponse(e.to_string()))?;
    let status = raw
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderCallError::InvalidResponse("missing status field".to_string()))?
        .to_string();
    let provider_call_id = raw.get("sid").and_then(Value::as_str).map(str::to_string);
    Ok(CallResult {
        status,
        provider_call_id,
        raw,
    })
}

/// Error bodies carry a `message`; fall back to the raw text otherwise.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn credentials() -> ProviderCredentials {
        ProviderCredentials {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
        }
    }

    /// Answers one request with a canned response and records what it got.
    async fn fake_provider(status_line: &'static str, body: &'static str) -> (String, Arc<Mutex<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_in_task = seen.clone();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) {
                    break;
                }
            }
            *seen_in_task.lock().expect("lock") = String::from_utf8_lossy(&buf).to_string();
            let resp = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(resp.as_bytes()).await;
        });
        (format!("http://{}", addr), seen)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let content_len = head
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= content_len
    }

    fn request() -> CallRequest {
        CallRequest {
            to: "+15550001".to_string(),
            from: "+15559999".to_string(),
            callback_url: "https://bridge.example.com/webhook/provider/AbC.xml".to_string(),
        }
    }

    #[test]
    fn calls_url_embeds_account() {
        assert_eq!(
            calls_url("https://api.twilio.com/", "AC123"),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json"
        );
    }

    #[tokio::test]
    async fn queued_response_is_parsed() {
        let (base, seen) =
            fake_provider("201 Created", r#"{"sid":"CA42","status":"queued","to":"+15550001"}"#).await;
        let adapter = TwilioAdapter::new(&base, credentials(), Duration::from_secs(5)).expect("adapter");

        let result = adapter.place_call(request()).await.expect("placed");

        assert!(result.is_queued());
        assert_eq!(result.provider_call_id.as_deref(), Some("CA42"));
        assert_eq!(result.raw["to"], "+15550001");
        let seen = seen.lock().expect("lock").clone();
        assert!(seen.starts_with("POST /2010-04-01/Accounts/AC123/Calls.json"));
        // base64("AC123:secret")
        assert!(seen.to_ascii_lowercase().contains("authorization: basic qumxmjm6c2vjcmv0"));
        assert!(seen.contains("To=%2B15550001"));
        assert!(seen.contains("From=%2B15559999"));
        assert!(seen.contains("Url=https%3A%2F%2Fbridge.example.com%2Fwebhook%2Fprovider%2FAbC.xml"));
    }

    #[tokio::test]
    async fn non_queued_status_is_returned_for_caller_to_judge() {
        let (base, _) = fake_provider("200 OK", r#"{"sid":"CA1","status":"failed"}"#).await;
        let adapter = TwilioAdapter::new(&base, credentials(), Duration::from_secs(5)).expect("adapter");

        let result = adapter.place_call(request()).await.expect("placed");

        assert!(!result.is_queued());
        assert_eq!(result.status, "failed");
    }

    #[tokio::test]
    async fn error_status_maps_to_rejected_with_message() {
        let (base, _) = fake_provider(
            "400 Bad Request",
            r#"{"code":21211,"message":"The 'To' number is not valid.","status":400}"#,
        )
        .await;
        let adapter = TwilioAdapter::new(&base, credentials(), Duration::from_secs(5)).expect("adapter");

        let err = adapter.place_call(request()).await.expect_err("rejected");

        assert_eq!(
            err,
            ProviderCallError::Rejected {
                status: 400,
                message: "The 'To' number is not valid.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let (base, _) = fake_provider("200 OK", "not json").await;
        let adapter = TwilioAdapter::new(&base, credentials(), Duration::from_secs(5)).expect("adapter");

        let err = adapter.place_call(request()).await.expect_err("invalid");

        assert!(matches!(err, ProviderCallError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_provider_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let adapter = TwilioAdapter::new(&format!("http://{}", addr), credentials(), Duration::from_secs(2))
            .expect("adapter");

        let err = adapter.place_call(request()).await.expect_err("transport");

        assert!(matches!(err, ProviderCallError::Transport(_)));
    }
}
