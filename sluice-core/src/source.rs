//! Where a run reads its records from.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configured input for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// A local csv, parquet or json file.
    File { path: PathBuf },
    /// An HTTP endpoint returning `{"results": [...]}`.
    Http(HttpSpec),
}

/// Request settings for an HTTP source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSpec {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("data/input.csv"),
        }
    }
}

impl SourceSpec {
    /// Path or URL, for logs and artifact entries.
    pub fn location(&self) -> String {
        match self {
            Self::File { path } => path.display().to_string(),
            Self::Http(http) => http.url.clone(),
        }
    }
}

/// GET client for JSON APIs that wrap their records in a `results` array.
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    headers: BTreeMap<String, String>,
    query: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn from_spec(spec: &HttpSpec) -> Self {
        Self {
            url: spec.url.clone(),
            headers: spec.headers.clone(),
            query: spec
                .query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timeout: spec.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Fetch the `results` array. No retries.
    pub async fn fetch(&self) -> Result<Vec<Value>, FetchError> {
        let transport = |source| FetchError::Transport {
            url: self.url.clone(),
            source,
        };

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(transport)?;

        let mut request = client.get(&self.url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }

        tracing::debug!(url = %self.url, "Fetching records");
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        let mut value: Value =
            serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
                url: self.url.clone(),
                source,
            })?;

        let records = match value.get_mut("results").map(Value::take) {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(FetchError::MissingResults {
                    url: self.url.clone(),
                });
            }
        };
        tracing::info!(url = %self.url, records = records.len(), "Fetched records");
        Ok(records)
    }
}
