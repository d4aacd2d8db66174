use super::{empty_response, json_response, text_response, App};
use crate::vault::VaultClient;
use faas_provider_core::SecretRequest;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::error;

/// Method switch over the secret store passthrough.
///
/// The store's 204 responses map to 201 for create and 200 for update and
/// delete; listing flattens the store's key list into `[{name}, ...]`.
pub(crate) async fn handle(app: &App, request: Request<Body>) -> Response<Body> {
    app.stats.incr("secrets.called", &[]);

    let Some(vault) = app.vault.clone() else {
        return text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "secret store is not configured",
        );
    };

    match *request.method() {
        Method::GET => list(&vault).await,
        Method::POST => write(&vault, request, StatusCode::CREATED).await,
        Method::PUT => write(&vault, request, StatusCode::OK).await,
        Method::DELETE => remove(&vault, request).await,
        _ => empty_response(StatusCode::BAD_REQUEST),
    }
}

async fn list(vault: &Arc<VaultClient>) -> Response<Body> {
    match vault.list_secrets().await {
        Ok(names) => {
            let secrets: Vec<SecretRequest> = names
                .into_iter()
                .map(|name| SecretRequest { name, value: None })
                .collect();
            json_response(StatusCode::OK, &secrets)
        }
        Err(error) => {
            error!(%error, "failed to list secrets");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

async fn write(
    vault: &Arc<VaultClient>,
    request: Request<Body>,
    success: StatusCode,
) -> Response<Body> {
    let Some(secret) = decode(request).await else {
        return empty_response(StatusCode::BAD_REQUEST);
    };
    match vault
        .write_secret(&secret.name, secret.value.as_deref().unwrap_or_default())
        .await
    {
        Ok(()) => empty_response(success),
        Err(error) => {
            error!(secret = %secret.name, %error, "failed to write secret");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

async fn remove(vault: &Arc<VaultClient>, request: Request<Body>) -> Response<Body> {
    let Some(secret) = decode(request).await else {
        return empty_response(StatusCode::BAD_REQUEST);
    };
    match vault.delete_secret(&secret.name).await {
        Ok(()) => empty_response(StatusCode::OK),
        Err(error) => {
            error!(secret = %secret.name, %error, "failed to delete secret");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

async fn decode(request: Request<Body>) -> Option<SecretRequest> {
    let body = hyper::body::to_bytes(request.into_body()).await.ok()?;
    serde_json::from_slice::<SecretRequest>(&body)
        .ok()
        .filter(|secret| !secret.name.is_empty())
}
