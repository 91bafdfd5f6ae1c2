use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Spoken by the `/call/` test endpoint.
pub const TEST_CALL_MESSAGE: &str = "Testing bridge from alerting to G S M call";

/// Legacy dashboard alert notification. Every field is optional and an
/// explicit `null` reads as absent; only `title` and `message` reach the
/// voice script.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertPayload {
    pub dashboard_id: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub eval_matches: Vec<EvalMatch>,
    #[serde(deserialize_with = "null_as_default")]
    pub image_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    pub org_id: Option<i64>,
    pub panel_id: Option<i64>,
    pub rule_id: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub rule_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub rule_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    pub tags: Value,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvalMatch {
    pub value: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub metric: String,
    pub tags: Value,
}

impl AlertPayload {
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Empty preamble, configured pre-message, title, message.
    pub fn script_lines(&self, pre_message: &str) -> Vec<String> {
        vec![
            String::new(),
            pre_message.to_string(),
            self.title.clone(),
            self.message.clone(),
        ]
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn test_call_lines() -> Vec<String> {
    vec![TEST_CALL_MESSAGE.to_string()]
}
