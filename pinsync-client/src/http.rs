//! REST client for the cloud API
//!
//! Every call is bounded by the configured request timeout (8 s by
//! default). A call that runs out of time is dropped, which aborts the
//! in-flight request, and returns `ClientError::Timeout`. Nothing is
//! retried here; the session manager decides about re-authentication.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::api::AUTH_SCHEME;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::Instrument;

pub use reqwest::Method;

// ==================== Session token cell ====================

/// Shared slot for the live session token
///
/// Written only by the session manager, read by every REST call.
#[derive(Debug, Clone, Default)]
pub struct TokenCell {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }
}

// ==================== Request bodies ====================

/// One file part of a multipart upload
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Multipart form kept as plain data so a call can be replayed
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        });
        self
    }

    fn to_form(&self) -> ClientResult<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &self.files {
            let part = reqwest::multipart::Part::bytes(file.bytes.clone())
                .file_name(file.file_name.clone())
                .mime_str(&file.mime)?;
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartBody),
}

impl RequestBody {
    pub fn json<T: serde::Serialize>(value: &T) -> ClientResult<Self> {
        Ok(RequestBody::Json(serde_json::to_value(value)?))
    }
}

// ==================== Client ====================

#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    token: TokenCell,
    developer_token: Option<String>,
    sequence: Arc<AtomicU64>,
}

impl RestClient {
    pub fn new(config: &ClientConfig, token: TokenCell) -> ClientResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
            token,
            developer_token: config.developer_token.clone(),
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_cell(&self) -> &TokenCell {
        &self.token
    }

    pub fn has_developer_token(&self) -> bool {
        self.developer_token.is_some()
    }

    /// Number of calls issued so far
    pub fn calls_issued(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    fn auth_header(&self) -> Option<String> {
        self.developer_token
            .clone()
            .or_else(|| self.token.get())
            .map(|t| format!("{} {}", AUTH_SCHEME, t))
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// Issue one request and return the decoded JSON body
    ///
    /// A 2xx response with an empty body yields `Value::Null`; a non-JSON
    /// body is returned as `Value::String`.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody,
        requires_auth: bool,
    ) -> ClientResult<Value> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let span = tracing::debug_span!("rest", seq, method = %method, endpoint);

        async {
            let mut req = self.client.request(method.clone(), self.url(endpoint));
            if requires_auth {
                let auth = self.auth_header().ok_or_else(|| {
                    ClientError::AuthFailed("no session token available".into())
                })?;
                req = req.header(reqwest::header::AUTHORIZATION, auth);
            }
            req = match &body {
                RequestBody::Empty => req,
                RequestBody::Json(value) => req.json(value),
                RequestBody::Multipart(form) => req.multipart(form.to_form()?),
            };

            let exchange = async {
                let response = req.send().await?;
                Self::handle_response(response).await
            };

            // One deadline covers connect, send and reading the body
            let result = match tokio::time::timeout(self.timeout, exchange).await {
                Ok(Err(ClientError::Http(e))) if e.is_timeout() => Err(ClientError::Timeout),
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Request timed out"
                    );
                    Err(ClientError::Timeout)
                }
            };
            if let Err(e) = &result {
                tracing::debug!(error = %e, "Request failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    /// `call` with the body decoded into `T`
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody,
        requires_auth: bool,
    ) -> ClientResult<T> {
        let value = self.call(method, endpoint, body, requires_auth).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::InvalidResponse(format!("{}: {}", endpoint, e)))
    }

    async fn handle_response(response: reqwest::Response) -> ClientResult<Value> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Err(ClientError::AuthFailed(format!("HTTP {}: {}", status.as_u16(), text)))
                }
                _ => Err(ClientError::Api {
                    status: status.as_u16(),
                    body: text,
                }),
            };
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cell_shared() {
        let cell = TokenCell::new();
        let reader = cell.clone();
        assert!(!reader.is_set());
        cell.set("abc");
        assert_eq!(reader.get().as_deref(), Some("abc"));
        cell.clear();
        assert!(reader.get().is_none());
    }

    #[test]
    fn test_auth_header_prefers_developer_token() {
        let cell = TokenCell::new();
        cell.set("session");
        let config = ClientConfig::new("http://localhost:1");
        let client = RestClient::new(&config, cell.clone()).unwrap();
        assert_eq!(client.auth_header().as_deref(), Some("SToken session"));

        let config = ClientConfig::new("http://localhost:1").with_developer_token("dev");
        let client = RestClient::new(&config, cell).unwrap();
        assert_eq!(client.auth_header().as_deref(), Some("SToken dev"));
    }

    #[test]
    fn test_url_join() {
        let config = ClientConfig::new("http://localhost:1/");
        let client = RestClient::new(&config, TokenCell::new()).unwrap();
        assert_eq!(client.url("/api/config/"), "http://localhost:1/api/config/");
        assert_eq!(client.url("api/config/"), "http://localhost:1/api/config/");
    }

    #[tokio::test]
    async fn test_auth_required_without_token() {
        let config = ClientConfig::new("http://localhost:1");
        let client = RestClient::new(&config, TokenCell::new()).unwrap();
        let err = client
            .call(Method::GET, "/api/config/", RequestBody::Empty, true)
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(client.calls_issued(), 1);
    }
}
