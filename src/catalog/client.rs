//! HTTP client for the central authority: settings fetch, token
//! acquisition and report upload, all sharing one retry-loop shape.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::report::Report;

const TOKEN_PATH: &str = "/token";
const REPORT_PATH: &str = "/report";
const SETTINGS_PATH: &str = "/settings";
const NOT_FOUND_MARKER: &str = "NoSuchKey";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request to {0} failed with status {1}")]
    BadStatus(&'static str, reqwest::StatusCode),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("failed to build mTLS identity: {0}")]
    Identity(String),
}

/// Standard client-credentials JWT envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
}

pub struct CentralAuthorityClient {
    http: Client,
    server_url: String,
    client_id: String,
    fetch_retry_attempts: u32,
    fetch_retry_backoff: Duration,
}

impl CentralAuthorityClient {
    pub fn new(
        server_url: String,
        client_id: String,
        client_cert_file: Option<&Path>,
        client_key_file: Option<&Path>,
        fetch_retry_attempts: u32,
        fetch_retry_backoff_ms: u64,
    ) -> Result<Self, ClientError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(20));

        if let (Some(cert), Some(key)) = (client_cert_file, client_key_file) {
            let mut pem = std::fs::read(cert)
                .map_err(|e| ClientError::Identity(format!("reading {}: {e}", cert.display())))?;
            let mut key_bytes = std::fs::read(key)
                .map_err(|e| ClientError::Identity(format!("reading {}: {e}", key.display())))?;
            pem.append(&mut key_bytes);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| ClientError::Identity(e.to_string()))?;
            builder = builder.identity(identity);
        }

        let http = builder.build()?;

        Ok(Self {
            http,
            server_url,
            client_id,
            fetch_retry_attempts,
            fetch_retry_backoff: Duration::from_millis(fetch_retry_backoff_ms),
        })
    }

    /// `GET <ServerURL>/settings/<relpath>`. Retries transport errors and
    /// non-2xx responses up to `fetch_retry_attempts` times with a fixed
    /// backoff; a body containing the literal token `NoSuchKey` is treated
    /// as not-found and is never retried.
    pub async fn load_api_configuration_file(&self, rel_path: &str) -> Result<String, ClientError> {
        let url = format!("{}{SETTINGS_PATH}/{}", self.server_url, rel_path.trim_start_matches('/'));

        let mut last_err = None;
        for attempt in 1..=self.fetch_retry_attempts.max(1) {
            match self.http.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if body.contains(NOT_FOUND_MARKER) {
                        return Err(ClientError::NotFound(rel_path.to_string()));
                    }
                    if status.is_success() {
                        return Ok(body);
                    }
                    warn!(url, %status, attempt, "settings fetch returned non-2xx");
                    last_err = Some(ClientError::BadStatus("settings", status));
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "settings fetch transport error");
                    last_err = Some(ClientError::Transport(e));
                }
            }

            if attempt < self.fetch_retry_attempts {
                tokio::time::sleep(self.fetch_retry_backoff).await;
            }
        }

        Err(last_err.expect("loop runs at least once"))
    }

    /// `POST <ServerURL>/token` with a client-credentials grant.
    pub async fn fetch_token(&self) -> Result<TokenResponse, ClientError> {
        let url = format!("{}{TOKEN_PATH}", self.server_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::BadStatus("token", status));
        }

        Ok(response.json().await?)
    }

    /// `POST <ServerURL>/report` with bearer auth. A status >= 300 is
    /// logged and surfaced as an error but never retried — the next
    /// reporting window sends a fresh report.
    pub async fn send_report(&self, token: &str, report: &Report) -> Result<(), ClientError> {
        let url = format!("{}{REPORT_PATH}", self.server_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(report)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, %status, "report upload rejected by central authority");
            return Err(ClientError::BadStatus("report", status));
        }

        Ok(())
    }
}
