use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RestError {
    #[error("avi api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl RestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            RestError::Api { body, .. } => body,
            _ => "",
        }
    }
}

/// Seam between the diff engine and the wire. The production implementation
/// is a reqwest client; tests substitute an in-memory transport.
#[async_trait]
pub trait AviTransport: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, RestError>;
    async fn post(&self, path: &str, body: &Value) -> Result<Value, RestError>;
    async fn put(&self, path: &str, body: &Value) -> Result<Value, RestError>;
    async fn delete(&self, path: &str) -> Result<Value, RestError>;
}

/// JSON REST client for one Avi controller endpoint.
pub struct AviRestClient {
    base_url: String,
    http: reqwest::Client,
}

impl AviRestClient {
    pub fn new(base_url: &str, timeout: Duration) -> crate::Result<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(format!("controller url must start with http:// or https://, got: {base_url}").into());
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_error(e: reqwest::Error) -> RestError {
        if e.is_timeout() {
            RestError::DeadlineExceeded
        } else {
            RestError::Transport(e.to_string())
        }
    }

    async fn into_result(response: reqwest::Response) -> Result<Value, RestError> {
        let status = response.status();
        if status.is_success() {
            if status == reqwest::StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            return response.json::<Value>().await.map_err(Self::map_error);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RestError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl AviTransport for AviRestClient {
    async fn get(&self, path: &str) -> Result<Value, RestError> {
        let response = self.http.get(self.url(path)).send().await.map_err(Self::map_error)?;
        Self::into_result(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RestError> {
        let response = self.http.post(self.url(path)).json(body).send().await.map_err(Self::map_error)?;
        Self::into_result(response).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value, RestError> {
        let response = self.http.put(self.url(path)).json(body).send().await.map_err(Self::map_error)?;
        Self::into_result(response).await
    }

    async fn delete(&self, path: &str) -> Result<Value, RestError> {
        let response = self.http.delete(self.url(path)).send().await.map_err(Self::map_error)?;
        Self::into_result(response).await
    }
}

/// Fixed-size pool of transports. Client selection uses the same bucket hash
/// as the work queues, so every shard has an affiliated client and all
/// operations for one key arrive at the remote side in order.
pub struct ClientPool {
    clients: Vec<Arc<dyn AviTransport>>,
}

impl ClientPool {
    pub fn new(clients: Vec<Arc<dyn AviTransport>>) -> Self {
        Self { clients }
    }

    pub fn for_controller(base_url: &str, timeout: Duration, size: u32) -> crate::Result<Self> {
        let mut clients: Vec<Arc<dyn AviTransport>> = Vec::new();
        for _ in 0..size.max(1) {
            clients.push(Arc::new(AviRestClient::new(base_url, timeout)?));
        }
        Ok(Self { clients })
    }

    pub fn client_for_bucket(&self, bucket: u32) -> Arc<dyn AviTransport> {
        let index = (bucket as usize) % self.clients.len();
        Arc::clone(&self.clients[index])
    }

    pub fn primary(&self) -> Arc<dyn AviTransport> {
        Arc::clone(&self.clients[0])
    }
}
