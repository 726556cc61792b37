use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{BackendFuture, TranslateError, TranslationBackend};

/// Client for a `/batch-translate` endpoint that translates a whole array per call.
#[derive(Debug, Clone)]
pub struct ProxyBackend {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct ProxyRequest<'a> {
    texts: &'a [String],
    from: &'a str,
    to: &'a str,
}

#[derive(Deserialize)]
struct ProxyResponse {
    results: Option<Vec<String>>,
}

impl ProxyBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl TranslationBackend for ProxyBackend {
    fn name(&self) -> &str {
        "proxy"
    }

    fn translate<'a>(&'a self, texts: &'a [String], from: &'a str, to: &'a str) -> BackendFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&ProxyRequest { texts, from, to })
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(TranslateError::Http(status));
            }
            let body = response.text().await?;
            let parsed: ProxyResponse = serde_json::from_str(&body)
                .map_err(|err| TranslateError::Malformed(format!("invalid JSON: {}", err)))?;
            let results = parsed
                .results
                .ok_or_else(|| TranslateError::Malformed("missing results".to_string()))?;
            if results.len() != texts.len() {
                return Err(TranslateError::Malformed(format!(
                    "expected {} translations, got {}",
                    texts.len(),
                    results.len()
                )));
            }
            Ok(results)
        })
    }
}
