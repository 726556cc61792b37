use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::{BackendFuture, TranslateError, TranslationBackend};

pub const DEFAULT_ENDPOINT: &str = "https://fanyi-api.baidu.com/api/trans/vip/translate";
const SUCCESS_CODE: &str = "52000";
const LINE_SEPARATOR: &str = "\n";

#[derive(Clone)]
pub struct BaiduCredentials {
    pub app_id: String,
    pub secret_key: String,
}

impl std::fmt::Debug for BaiduCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaiduCredentials")
            .field("app_id", &self.app_id)
            .field("secret_key", &"***")
            .finish()
    }
}

impl BaiduCredentials {
    /// Explicit values win over `BAIDU_APP_ID` / `BAIDU_SECRET_KEY`.
    pub fn resolve(app_id: Option<&str>, secret_key: Option<&str>) -> Option<Self> {
        let app_id = non_empty(app_id).or_else(|| get_env("BAIDU_APP_ID"))?;
        let secret_key = non_empty(secret_key).or_else(|| get_env("BAIDU_SECRET_KEY"))?;
        Some(Self { app_id, secret_key })
    }
}

/// Signed GET client for the Baidu general translation API.
#[derive(Debug, Clone)]
pub struct BaiduBackend {
    client: reqwest::Client,
    endpoint: String,
    credentials: BaiduCredentials,
}

impl BaiduBackend {
    pub fn new(credentials: BaiduCredentials, timeout: Duration) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if !endpoint.trim().is_empty() {
            self.endpoint = endpoint;
        }
        self
    }
}

impl TranslationBackend for BaiduBackend {
    fn name(&self) -> &str {
        "baidu"
    }

    fn translate<'a>(&'a self, texts: &'a [String], from: &'a str, to: &'a str) -> BackendFuture<'a> {
        Box::pin(async move {
            let query = join_query(texts);
            let salt = current_salt();
            let sign = sign(
                &self.credentials.app_id,
                &query,
                &salt,
                &self.credentials.secret_key,
            );
            debug!(count = texts.len(), "submitting baidu translation batch");
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("q", query.as_str()),
                    ("appid", self.credentials.app_id.as_str()),
                    ("salt", salt.as_str()),
                    ("from", from),
                    ("to", to),
                    ("sign", sign.as_str()),
                ])
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(TranslateError::Http(status));
            }
            let body = response.text().await?;
            parse_response(&body, texts.len())
        })
    }
}

/// `md5(appid + q + salt + secret)` as lowercase hex.
pub(crate) fn sign(app_id: &str, query: &str, salt: &str, secret_key: &str) -> String {
    let input = format!("{}{}{}{}", app_id, query, salt, secret_key);
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn join_query(texts: &[String]) -> String {
    texts
        .iter()
        .map(|text| text.replace(['\r', '\n'], " "))
        .collect::<Vec<_>>()
        .join(LINE_SEPARATOR)
}

fn current_salt() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Deserialize)]
struct BaiduResponse {
    trans_result: Option<Vec<BaiduItem>>,
    error_code: Option<Value>,
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaiduItem {
    dst: String,
}

fn parse_response(body: &str, expected: usize) -> Result<Vec<String>, TranslateError> {
    let parsed: BaiduResponse = serde_json::from_str(body)
        .map_err(|err| TranslateError::Malformed(format!("invalid JSON: {}", err)))?;
    if let Some(code) = parsed.error_code {
        let code = match code {
            Value::String(value) => value,
            other => other.to_string(),
        };
        if code != SUCCESS_CODE {
            return Err(TranslateError::Backend {
                code,
                message: parsed
                    .error_msg
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }
    }
    let items = parsed
        .trans_result
        .ok_or_else(|| TranslateError::Malformed("missing trans_result".to_string()))?;
    if items.len() != expected {
        return Err(TranslateError::Malformed(format!(
            "expected {} translations, got {}",
            expected,
            items.len()
        )));
    }
    Ok(items.into_iter().map(|item| item.dst).collect())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
