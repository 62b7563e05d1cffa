use crate::types::{CallFailure, RawResponse};
use crate::{Error, ErrorContext, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, Proxy};
use serde_json::Value;
use std::env;
use std::time::Duration;

/// Where the API key goes on each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeyPlacement {
    /// `?{param}=key`, as most geo APIs expect.
    Query(String),
    Bearer,
}

/// reqwest-backed underlying call for JSON HTTP APIs.
///
/// Produces [`RawResponse`] for every completed exchange, whatever the
/// status, and [`CallFailure`] only when no status was received.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<(ApiKeyPlacement, String)>,
}

impl HttpTransport {
    /// Timeout and proxy are env-overridable:
    /// - `METERGUARD_HTTP_TIMEOUT_SECS` (default 30)
    /// - `METERGUARD_PROXY_URL`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let timeout_secs = env::var("METERGUARD_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("METERGUARD_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                format!("cannot build HTTP client: {}", e),
                ErrorContext::new().with_source("http_transport"),
            )
        })?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, placement: ApiKeyPlacement, key: impl Into<String>) -> Self {
        self.api_key = Some((placement, key.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET with `params` (a JSON object) encoded as the query string.
    pub async fn get_json(
        &self,
        endpoint: &str,
        params: &Value,
    ) -> std::result::Result<RawResponse, CallFailure> {
        self.send(Method::GET, endpoint, Some(query_pairs(params)), None)
            .await
    }

    /// POST with `body` as JSON.
    pub async fn post_json(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> std::result::Result<RawResponse, CallFailure> {
        self.send(Method::POST, endpoint, None, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: Option<Vec<(String, String)>>,
        body: Option<&Value>,
    ) -> std::result::Result<RawResponse, CallFailure> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut request = self.client.request(method, &url);
        if let Some(pairs) = &query {
            request = request.query(pairs);
        }
        match &self.api_key {
            Some((ApiKeyPlacement::Query(param), key)) => {
                request = request.query(&[(param.as_str(), key.as_str())]);
            }
            Some((ApiKeyPlacement::Bearer, key)) => {
                request = request.bearer_auth(key);
            }
            None => {}
        }
        if let Some(b) = body {
            request = request.json(b);
        }

        let resp = request.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let retry_after = retry_after(resp.headers());
        let text = resp.text().await.map_err(map_reqwest_error)?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(RawResponse {
            status_code: status,
            body,
            retry_after,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> CallFailure {
    if e.is_timeout() {
        CallFailure::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_body() {
        CallFailure::Network(e.to_string())
    } else {
        CallFailure::Other(e.to_string())
    }
}

/// Only the `Retry-After: <seconds>` form is supported.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: u64 = raw.parse().ok()?;
    Some(Duration::from_secs(secs))
}

fn query_pairs(params: &Value) -> Vec<(String, String)> {
    match params {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), s)
            })
            .collect(),
        _ => Vec::new(),
    }
}
