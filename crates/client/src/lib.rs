//! HTTP клиент каталога модулей.
//!
//! Тонкая обёртка над `GET/POST /api/graph` и `GET /api/health`.
//! Ошибки ответа сервера приводятся к [`ClientError::Api`] с человекочитаемым
//! сообщением: поле `message` из JSON, иначе текст тела, иначе код статуса.

use catalog::GraphSnapshotPayload;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ClientError {
    /// HTTP статус, если ошибка пришла от сервера
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(err) => err.status().map(|s| s.as_u16()),
            ClientError::Decode(_) => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GraphClient {
    base_url: String,
    http: reqwest::Client,
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    /// Клиент с заранее настроенным `reqwest::Client` (таймауты, прокси)
    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn fetch_snapshot(&self) -> ClientResult<GraphSnapshotPayload> {
        let response = self.http.get(self.url("/api/graph")).send().await?;
        let response = ensure_success(response).await?;

        let body = response.bytes().await?;
        let snapshot: GraphSnapshotPayload =
            serde_json::from_slice(&body).map_err(ClientError::Decode)?;
        debug!(
            modules = snapshot.modules.len(),
            artifacts = snapshot.artifacts.len(),
            "Fetched graph snapshot"
        );
        Ok(snapshot)
    }

    pub async fn save_snapshot(&self, snapshot: &GraphSnapshotPayload) -> ClientResult<()> {
        let response = self
            .http
            .post(self.url("/api/graph"))
            .json(snapshot)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// `true`, если сервер ответил `{"status":"ok"}`
    pub async fn health(&self) -> ClientResult<bool> {
        let response = self.http.get(self.url("/api/health")).send().await?;
        let response = ensure_success(response).await?;
        let body = response.bytes().await?;
        let value: serde_json::Value = serde_json::from_slice(&body).map_err(ClientError::Decode)?;
        Ok(value.get("status").and_then(|s| s.as_str()) == Some("ok"))
    }
}

async fn ensure_success(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    warn!(status = status.as_u16(), %message, "Catalog API request failed");
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(ErrorPayload {
        message: Some(message),
    }) = serde_json::from_str::<ErrorPayload>(body)
    {
        if !message.trim().is_empty() {
            return message;
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    format!("Request failed with status {}", status.as_u16())
}
