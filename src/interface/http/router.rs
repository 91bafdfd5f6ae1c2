//! Route table and handlers for the three webhook endpoints.

use std::sync::Arc;

use crate::interface::http::auth::AuthGuard;
use crate::interface::http::request::{HttpRequest, HttpResponse};
use crate::service::alert::{self, AlertPayload};
use crate::service::correlation::CorrelationStore;
use crate::service::dispatch::{spawn_detached, CALLBACK_PATH_PREFIX, CALLBACK_SUFFIX};
use crate::service::script::SCRIPT_CONTENT_TYPE;
use crate::shared::config::BridgeConfig;
use crate::shared::entities::CorrelationId;
use crate::shared::error::RequestError;
use crate::shared::ports::AlertNotifier;

pub const TEST_CALL_PATH: &str = "/call/";
pub const ALERT_PATH: &str = "/webhook/alert/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteToggles {
    pub call: bool,
    pub alert: bool,
    pub provider: bool,
}

pub struct RouterState {
    pub store: CorrelationStore,
    pub notifier: Arc<dyn AlertNotifier>,
    pub auth: AuthGuard,
    pub pre_message: String,
    pub routes: RouteToggles,
}

#[derive(Clone)]
pub struct Router {
    state: Arc<RouterState>,
}

enum Route {
    TestCall,
    ProviderCallback,
    Alert,
}

impl Router {
    pub fn new(state: RouterState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn from_config(
        cfg: &BridgeConfig,
        store: CorrelationStore,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Self {
        let webhooks = &cfg.webhooks;
        Self::new(RouterState {
            store,
            notifier,
            auth: AuthGuard::new(&webhooks.alert.username, &webhooks.alert.password),
            pre_message: webhooks.alert.pre_message.clone(),
            routes: RouteToggles {
                call: webhooks.call.enabled,
                alert: webhooks.alert.enabled,
                provider: webhooks.provider.enabled,
            },
        })
    }

    /// Must run inside a Tokio runtime: dispatch rounds are spawned from here.
    pub fn handle(&self, req: &HttpRequest) -> HttpResponse {
        let Some((route, method)) = self.match_route(&req.path) else {
            return HttpResponse::error(RequestError::NotFound);
        };
        if req.method != method {
            return HttpResponse::error(RequestError::MethodNotAllowed).with_header("Allow", method);
        }
        match route {
            Route::TestCall => self.handle_test_call(),
            Route::ProviderCallback => self.handle_callback(&req.path),
            Route::Alert => self
                .state
                .auth
                .check(req.header("authorization"), || self.handle_alert(&req.body)),
        }
    }

    fn match_route(&self, path: &str) -> Option<(Route, &'static str)> {
        let routes = self.state.routes;
        if routes.call && path == TEST_CALL_PATH {
            return Some((Route::TestCall, "GET"));
        }
        if routes.provider && path.starts_with(CALLBACK_PATH_PREFIX) {
            return Some((Route::ProviderCallback, "POST"));
        }
        if routes.alert && path == ALERT_PATH {
            return Some((Route::Alert, "POST"));
        }
        None
    }

    fn handle_test_call(&self) -> HttpResponse {
        log::info!("[http] test call requested");
        spawn_detached(self.state.notifier.clone(), alert::test_call_lines(), "test-call");
        HttpResponse::accepted()
    }

    fn handle_callback(&self, path: &str) -> HttpResponse {
        let Some(id) = extract_correlation_id(path) else {
            log::error!("[http] callback without usable id path={}", path);
            return HttpResponse::error(RequestError::BadRequest);
        };
        match self.state.store.take(&id) {
            Some(script) => {
                log::debug!("[http] serving script id={}", id);
                HttpResponse::ok(SCRIPT_CONTENT_TYPE, script)
            }
            None => {
                log::error!("[http] script not found id={}", id);
                HttpResponse::error(RequestError::NotFound)
            }
        }
    }

    fn handle_alert(&self, body: &[u8]) -> HttpResponse {
        let payload = match AlertPayload::from_json(body) {
            Ok(payload) => payload,
            Err(err) => {
                log::error!("[http] alert payload rejected: {}", err);
                return HttpResponse::error(RequestError::BadRequest);
            }
        };
        log::info!(
            "[http] alert accepted rule={} state={} title={}",
            payload.rule_name,
            payload.state,
            payload.title
        );
        let lines = payload.script_lines(&self.state.pre_message);
        spawn_detached(self.state.notifier.clone(), lines, "alert");
        HttpResponse::accepted()
    }
}

/// Takes the segment between the callback prefix and the `.xml` suffix.
pub fn extract_correlation_id(path: &str) -> Option<CorrelationId> {
    let segment = path
        .strip_prefix(CALLBACK_PATH_PREFIX)?
        .strip_suffix(CALLBACK_SUFFIX)?;
    CorrelationId::parse(segment).ok()
}
