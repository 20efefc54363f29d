//! Remote sync gateway: the request/response boundary to the remote
//! authority.
//!
//! The reconciler only depends on the [`SyncGateway`] contract;
//! [`HttpGateway`] is the production implementation against the relay's
//! REST API with Ed25519-signed requests.

use crate::store::{ServerVersion, SessionProfile};
use crate::sync::auth::{format_auth_header, sign_request};
use crate::sync::models::{ProfilePatch, RemotePage};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the remote gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The supplied `expected_server_version` no longer matches; the
    /// remote side has advanced since our baseline.
    #[error("version conflict for {id}: expected server version {expected}")]
    VersionConflict { id: Uuid, expected: ServerVersion },

    #[error("remote record not found: {0}")]
    NotFound(Uuid),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Contract the reconciler consumes. Blocking-with-timeout from the
/// reconciler's perspective; any [`GatewayError::Transport`] or
/// [`GatewayError::Timeout`] aborts the in-flight cycle.
#[async_trait]
pub trait SyncGateway: Send + Sync {
    /// Paginated listing of the owner's records, same ordering contract
    /// as the local store. Includes tombstones.
    async fn list(&self, owner: Uuid, page: u32, page_size: u32) -> Result<RemotePage>;

    /// Create a never-synced record. The response carries the assigned
    /// `server_version`.
    async fn create(&self, owner: Uuid, profile: &SessionProfile) -> Result<SessionProfile>;

    /// Update an existing record, guarded by optimistic concurrency.
    async fn update(
        &self,
        id: Uuid,
        patch: &ProfilePatch,
        expected: ServerVersion,
    ) -> Result<SessionProfile>;

    /// Soft-delete an existing record, guarded the same way. Returns the
    /// new `server_version` of the tombstone.
    async fn soft_delete(
        &self,
        id: Uuid,
        expected: ServerVersion,
        deleted_at: i64,
    ) -> Result<ServerVersion>;
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    patch: &'a ProfilePatch,
    expected_server_version: ServerVersion,
}

#[derive(Serialize)]
struct DeleteRequest {
    expected_server_version: ServerVersion,
    deleted_at: i64,
}

#[derive(Deserialize)]
struct DeleteResponse {
    server_version: ServerVersion,
}

/// HTTP client for the hostvault relay.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    device_id: Uuid,
    signing_key: SigningKey,
}

impl HttpGateway {
    /// Create a gateway client with a 30 second request timeout.
    pub fn new(base_url: &str, device_id: Uuid, signing_key: SigningKey) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            device_id,
            signing_key,
        })
    }

    /// Build a gateway from a stored 32-byte signing key seed.
    pub fn from_seed(base_url: &str, device_id: Uuid, seed: [u8; 32]) -> Result<Self> {
        Self::new(base_url, device_id, SigningKey::from_bytes(&seed))
    }

    async fn send_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let timestamp = chrono::Utc::now().timestamp();
        let nonce = Uuid::new_v4().to_string();
        let signature = sign_request(
            &self.signing_key,
            method.as_str(),
            path,
            timestamp,
            &nonce,
            &body,
        );
        let auth_header = format_auth_header(&self.device_id, timestamp, &nonce, &signature);

        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", auth_header)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    async fn fail_for_status(response: reqwest::Response) -> GatewayError {
        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
        GatewayError::Transport(format!("relay error {}: {}", status, body))
    }
}

#[async_trait]
impl SyncGateway for HttpGateway {
    async fn list(&self, owner: Uuid, page: u32, page_size: u32) -> Result<RemotePage> {
        let path = format!(
            "/api/v1/profiles?owner={}&page={}&page_size={}",
            owner, page, page_size
        );
        let response = self.send_signed(reqwest::Method::GET, &path, Vec::new()).await?;
        if !response.status().is_success() {
            return Err(Self::fail_for_status(response).await);
        }
        Self::read_json(response).await
    }

    async fn create(&self, owner: Uuid, profile: &SessionProfile) -> Result<SessionProfile> {
        let path = format!("/api/v1/profiles?owner={}", owner);
        let body = serde_json::to_vec(profile)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let response = self.send_signed(reqwest::Method::POST, &path, body).await?;
        if !response.status().is_success() {
            return Err(Self::fail_for_status(response).await);
        }
        Self::read_json(response).await
    }

    async fn update(
        &self,
        id: Uuid,
        patch: &ProfilePatch,
        expected: ServerVersion,
    ) -> Result<SessionProfile> {
        let path = format!("/api/v1/profiles/{}", id);
        let body = serde_json::to_vec(&UpdateRequest {
            patch,
            expected_server_version: expected,
        })
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let response = self.send_signed(reqwest::Method::PUT, &path, body).await?;
        match response.status() {
            s if s.is_success() => Self::read_json(response).await,
            reqwest::StatusCode::CONFLICT => Err(GatewayError::VersionConflict { id, expected }),
            reqwest::StatusCode::NOT_FOUND => Err(GatewayError::NotFound(id)),
            _ => Err(Self::fail_for_status(response).await),
        }
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        expected: ServerVersion,
        deleted_at: i64,
    ) -> Result<ServerVersion> {
        let path = format!("/api/v1/profiles/{}/delete", id);
        let body = serde_json::to_vec(&DeleteRequest {
            expected_server_version: expected,
            deleted_at,
        })
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let response = self.send_signed(reqwest::Method::POST, &path, body).await?;
        match response.status() {
            s if s.is_success() => {
                let ack: DeleteResponse = Self::read_json(response).await?;
                Ok(ack.server_version)
            }
            reqwest::StatusCode::CONFLICT => Err(GatewayError::VersionConflict { id, expected }),
            reqwest::StatusCode::NOT_FOUND => Err(GatewayError::NotFound(id)),
            _ => Err(Self::fail_for_status(response).await),
        }
    }
}
