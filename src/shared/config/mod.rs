use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

pub const ENV_CONFIG_PATH: &str = "BRIDGE_CONFIG";
pub const ENV_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
pub const ENV_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";

const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Top-level service configuration, read from a YAML file.
///
/// Every key is optional; absent keys take the defaults below so a partial
/// file (or an empty one) still yields a usable value.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Public base URL the call provider uses to reach this service.
    pub external_endpoint: String,
    pub http: HttpListenerConfig,
    pub https: HttpsListenerConfig,
    pub webhooks: WebhooksConfig,
    pub provider: ProviderConfig,
    pub correlation: CorrelationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpListenerConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for HttpListenerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpsListenerConfig {
    pub enabled: bool,
    pub listen: String,
    pub ssl_certificate: String,
    pub ssl_certificate_key: String,
}

impl Default for HttpsListenerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:8443".to_string(),
            ssl_certificate: String::new(),
            ssl_certificate_key: String::new(),
        }
    }
}

impl HttpsListenerConfig {
    /// Both PEM paths are needed; otherwise a self-signed certificate is generated.
    pub fn has_certificate(&self) -> bool {
        !self.ssl_certificate.trim().is_empty() && !self.ssl_certificate_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WebhooksConfig {
    pub call: CallWebhookConfig,
    #[serde(alias = "grafana")]
    pub alert: AlertWebhookConfig,
    #[serde(alias = "twilio")]
    pub provider: ProviderWebhookConfig,
}

impl WebhooksConfig {
    pub fn any_enabled(&self) -> bool {
        self.call.enabled || self.alert.enabled || self.provider.enabled
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CallWebhookConfig {
    pub enabled: bool,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct AlertWebhookConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
    pub pre_message: String,
}

impl fmt::Debug for AlertWebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertWebhookConfig")
            .field("enabled", &self.enabled)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pre_message", &self.pre_message)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProviderWebhookConfig {
    pub enabled: bool,
    pub voice: String,
    pub notify: Vec<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub call_timeout_sec: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.twilio.com".to_string(),
            call_timeout_sec: 10,
        }
    }
}

impl ProviderConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_sec.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// 0 keeps records until they are fetched.
    pub ttl_sec: u64,
    pub sweep_interval_sec: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            ttl_sec: 3600,
            sweep_interval_sec: 60,
        }
    }
}

impl CorrelationConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_sec > 0).then(|| Duration::from_secs(self.ttl_sec))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_sec.max(1))
    }
}

impl BridgeConfig {
    /// Reads and parses the YAML file at `path`.
    ///
    /// An unreadable or malformed file is an error; the caller is expected to
    /// abort startup on it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parse config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg = serde_yaml::from_str::<Self>(text)?;
        Ok(cfg)
    }

    /// Checks settings the service cannot run without and warns about risky ones.
    pub fn validate(&self) -> Result<()> {
        if !self.http.enabled && !self.https.enabled {
            bail!("neither http nor https listener is enabled");
        }
        if self.http.enabled && self.http.listen.trim().is_empty() {
            bail!("http.listen is empty");
        }
        if self.https.enabled && self.https.listen.trim().is_empty() {
            bail!("https.listen is empty");
        }
        if self.webhooks.provider.enabled && self.external_endpoint.trim().is_empty() {
            bail!("external_endpoint is required when the provider webhook is enabled");
        }
        if !self.webhooks.any_enabled() {
            log::warn!("[config] no webhook is enabled; every request will get 404");
        }
        if self.webhooks.alert.enabled && self.webhooks.alert.username.is_empty() {
            log::warn!("[config] webhooks.alert.username is empty; alert endpoint accepts an empty user");
        }
        if self.webhooks.provider.notify.is_empty() {
            log::warn!("[config] webhooks.provider.notify is empty; alerts will not place any call");
        }
        Ok(())
    }

    /// Base for callback links, without a trailing slash.
    pub fn callback_base(&self) -> String {
        self.external_endpoint.trim().trim_end_matches('/').to_string()
    }
}

pub fn config_path() -> PathBuf {
    std::env::var(ENV_CONFIG_PATH)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Account credentials for the call provider. Only ever taken from the environment.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

impl ProviderCredentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_sid = lookup(ENV_ACCOUNT_SID).unwrap_or_default();
        let auth_token = lookup(ENV_AUTH_TOKEN).unwrap_or_default();
        if account_sid.trim().is_empty() || auth_token.trim().is_empty() {
            return Err(anyhow!(
                "environment {} or {} is empty",
                ENV_ACCOUNT_SID,
                ENV_AUTH_TOKEN
            ));
        }
        Ok(Self {
            account_sid: account_sid.trim().to_string(),
            auth_token: auth_token.trim().to_string(),
        })
    }
}

/// Logging variables are read as `BRIDGE_LOG_*` first, then as plain `LOG_*`.
pub const LOG_ENV_PREFIX: &str = "BRIDGE_";

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "bridge.log";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogMode {
    Stdout,
    File,
}

impl LogMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "stdout" => Some(Self::Stdout),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub mode: LogMode,
    pub format: LogFormat,
    /// Set only in file mode.
    pub dir: Option<String>,
    pub file_name: String,
}

impl LoggingConfig {
    /// A log directory without an explicit mode implies file mode.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{LOG_ENV_PREFIX}{name}"))
                .or_else(|| lookup(name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let dir = var("LOG_DIR");
        let format = var("LOG_FORMAT")
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        let mode = var("LOG_MODE")
            .and_then(|v| LogMode::parse(&v))
            .unwrap_or(if dir.is_some() {
                LogMode::File
            } else {
                LogMode::Stdout
            });

        Self {
            mode,
            format,
            dir: match mode {
                LogMode::File => Some(dir.unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())),
                LogMode::Stdout => None,
            },
            file_name: var("LOG_FILE_NAME").unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
        }
    }
}

static LOGGING: OnceLock<LoggingConfig> = OnceLock::new();

pub fn logging_config() -> &'static LoggingConfig {
    LOGGING.get_or_init(|| LoggingConfig::from_lookup(|key| std::env::var(key).ok()))
}
