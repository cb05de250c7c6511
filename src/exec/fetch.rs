//! Outbound HTTP for network-capable tools
//!
//! Scripts describe a request as an options map; the host performs it with a
//! deadline and hands back a plain response map. Non-2xx statuses are data,
//! not errors. Only transport failures and timeouts fail the call.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::types::{DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS};

/// A fully resolved outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: reqwest::Method,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

/// What a script sees after a completed exchange
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    /// Raw response text
    pub body: String,
    /// Parsed body when the text is valid JSON
    pub json: Option<Value>,
    /// Milliseconds from send to fully read body
    pub duration: u64,
    /// Final URL including query parameters
    pub url: String,
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn pairs(value: Option<&Value>) -> Vec<(String, String)> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), scalar_text(v)))
            .collect(),
        _ => Vec::new(),
    }
}

impl FetchRequest {
    /// Build a request from a script's options map:
    /// `method`, `headers`, `query`, `body` and `timeout` (ms), all optional.
    pub fn from_options(url: &str, options: &Value) -> Result<Self, String> {
        let method = match options.get("method").and_then(Value::as_str) {
            Some(m) => reqwest::Method::from_bytes(m.to_uppercase().as_bytes())
                .map_err(|_| format!("invalid HTTP method '{}'", m))?,
            None => reqwest::Method::GET,
        };

        let body = match options.get("body") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        let timeout_ms = options
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .clamp(1, MAX_TIMEOUT_MS);

        Ok(Self {
            url: url.to_string(),
            method,
            headers: pairs(options.get("headers")),
            query: pairs(options.get("query")),
            body,
            timeout_ms,
        })
    }

    /// The target URL with query parameters appended
    pub fn resolved_url(&self) -> Result<reqwest::Url, String> {
        let mut url =
            reqwest::Url::parse(&self.url).map_err(|e| format!("invalid URL '{}': {}", self.url, e))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Perform the exchange, racing it against the request's deadline
    pub async fn send(self, client: &reqwest::Client) -> Result<FetchResponse, String> {
        let url = self.resolved_url()?;
        let timeout_ms = self.timeout_ms;

        let mut builder = client.request(self.method.clone(), url);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = self.body {
            builder = builder.body(body);
        }

        let started = Instant::now();
        let exchange = async {
            let response = builder.send().await.map_err(|e| e.to_string())?;
            let status = response.status();
            let final_url = response.url().to_string();
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect::<BTreeMap<_, _>>();
            let body = response.text().await.map_err(|e| e.to_string())?;
            Ok::<_, String>((status, final_url, headers, body))
        };

        let (status, url, headers, body) =
            tokio::time::timeout(Duration::from_millis(timeout_ms), exchange)
                .await
                .map_err(|_| format!("Request timeout after {}ms", timeout_ms))??;

        tracing::debug!("fetch {} -> {}", url, status);

        Ok(FetchResponse {
            ok: status.is_success(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            json: serde_json::from_str(&body).ok(),
            body,
            duration: started.elapsed().as_millis() as u64,
            url,
        })
    }
}
