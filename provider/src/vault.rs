//! Minimal Vault client: approle login, token renewal, and the secret CRUD
//! the passthrough handler needs.

use bytes::Bytes;
use hyper::{client::HttpConnector, Body, Method, Request, StatusCode, Uri};
use parking_lot::RwLock;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info};

const VAULT_TOKEN_HEADER: &str = "x-vault-token";

#[derive(Clone, Debug)]
pub(crate) struct VaultConfig {
    pub addr: String,
    pub default_policy: String,
    pub app_role_id: String,
    pub app_secret_id: String,
}

#[derive(Debug, Error)]
pub(crate) enum VaultError {
    #[error("secret store request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid secret store address: {0}")]
    Address(String),

    #[error("secret store returned status {0}")]
    Status(StatusCode),

    #[error("malformed secret store response: {0}")]
    Body(#[from] serde_json::Error),
}

pub(crate) struct VaultClient {
    client: hyper::Client<hyper_rustls::HttpsConnector<HttpConnector>>,
    config: VaultConfig,
    token: RwLock<String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<Auth>,
}

#[derive(Deserialize)]
struct Auth {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
}

#[derive(Deserialize)]
struct ListResponse {
    data: ListKeys,
}

#[derive(Deserialize)]
struct ListKeys {
    keys: Vec<String>,
}

// === impl VaultClient ===

impl VaultClient {
    pub fn new(config: VaultConfig) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            client: hyper::Client::builder().build(https),
            config,
            token: RwLock::new(String::new()),
        }
    }

    /// Exchanges approle credentials for a client token and returns its
    /// lease so the caller can schedule renewal.
    pub async fn login(&self) -> Result<Duration, VaultError> {
        let body = serde_json::to_vec(&serde_json::json!({
            "role_id": self.config.app_role_id,
            "secret_id": self.config.app_secret_id,
        }))?;
        let (status, bytes) = self
            .request(Method::POST, "/v1/auth/approle/login", Some(body))
            .await?;
        if !status.is_success() {
            return Err(VaultError::Status(status));
        }

        let login: LoginResponse = serde_json::from_slice(&bytes)?;
        let auth = login
            .auth
            .ok_or(VaultError::Status(StatusCode::UNAUTHORIZED))?;
        *self.token.write() = auth.client_token;
        info!("logged in to secret store");
        Ok(Duration::from_secs(auth.lease_duration.max(60)))
    }

    /// Renews the login token at half its lease interval for the life of
    /// the process.
    pub fn spawn_renewal(self: Arc<Self>, lease: Duration) {
        let client = Arc::downgrade(&self);
        let period = (lease / 2).max(Duration::from_secs(30));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(client) = client.upgrade() else {
                    return;
                };
                match client
                    .request(Method::POST, "/v1/auth/token/renew-self", None)
                    .await
                {
                    Ok((status, _)) if status.is_success() => {
                        debug!("renewed secret store token")
                    }
                    Ok((status, _)) => error!(%status, "token renewal rejected"),
                    Err(error) => error!(%error, "token renewal failed"),
                }
            }
        });
    }

    pub async fn list_secrets(&self) -> Result<Vec<String>, VaultError> {
        let path = format!("/v1/secret/{}?list=true", self.config.default_policy);
        let (status, bytes) = self.request(Method::GET, &path, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(VaultError::Status(status));
        }
        let list: ListResponse = serde_json::from_slice(&bytes)?;
        Ok(list.data.keys)
    }

    pub async fn write_secret(&self, name: &str, value: &str) -> Result<(), VaultError> {
        let path = format!("/v1/secret/{}/{}", self.config.default_policy, name);
        let body = serde_json::to_vec(&serde_json::json!({ "value": value }))?;
        let (status, _) = self.request(Method::POST, &path, Some(body)).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(VaultError::Status(status))
        }
    }

    pub async fn delete_secret(&self, name: &str) -> Result<(), VaultError> {
        let path = format!("/v1/secret/{}/{}", self.config.default_policy, name);
        let (status, _) = self.request(Method::DELETE, &path, None).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(VaultError::Status(status))
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes), VaultError> {
        let url = format!("{}{}", self.config.addr.trim_end_matches('/'), path);
        let uri = url
            .parse::<Uri>()
            .map_err(|e| VaultError::Address(e.to_string()))?;

        let mut request = Request::builder().method(method).uri(uri);
        let token = self.token.read().clone();
        if !token.is_empty() {
            request = request.header(VAULT_TOKEN_HEADER, token);
        }
        let request = request
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .map_err(|e| VaultError::Address(e.to_string()))?;

        let response = self.client.request(request).await?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;
        Ok((status, bytes))
    }
}
