use hyper::{client::HttpConnector, Body, Request, StatusCode, Uri};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const CONSUL_INDEX_HEADER: &str = "x-consul-index";
const CONSUL_TOKEN_HEADER: &str = "x-consul-token";

/// One service instance as reported by `/v1/catalog/service/<name>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CatalogService {
    pub node: String,
    pub address: String,
    pub service_name: String,
    pub service_address: String,
    pub service_port: u16,
}

#[derive(Clone, Debug)]
pub struct CatalogResponse {
    pub services: Vec<CatalogService>,
    /// Consul's raft index for the result, fed back into blocking queries.
    pub index: u64,
}

/// Blocking-query parameters: wait until the catalog index moves past
/// `index`, or `wait` elapses.
#[derive(Clone, Copy, Debug)]
pub struct WaitIndex {
    pub index: u64,
    pub wait: Duration,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid catalog address: {0}")]
    Address(String),

    #[error("catalog returned status {0}")]
    Status(StatusCode),

    #[error("malformed catalog response: {0}")]
    Body(#[from] serde_json::Error),
}

/// Read access to the service catalog.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Lists the instances of `name`. With `wait` set this is a blocking
    /// query that returns once the catalog changes or the wait expires.
    async fn service(
        &self,
        name: &str,
        wait: Option<WaitIndex>,
    ) -> Result<CatalogResponse, CatalogError>;
}

/// Catalog client over the Consul HTTP API.
pub struct HttpCatalog {
    client: hyper::Client<hyper_rustls::HttpsConnector<HttpConnector>>,
    base: String,
    token: Option<String>,
}

// === impl HttpCatalog ===

impl HttpCatalog {
    pub fn new(address: &str, token: Option<String>) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            client: hyper::Client::builder().build(https),
            base: address.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait::async_trait]
impl Catalog for HttpCatalog {
    async fn service(
        &self,
        name: &str,
        wait: Option<WaitIndex>,
    ) -> Result<CatalogResponse, CatalogError> {
        let mut url = format!("{}/v1/catalog/service/{}", self.base, name);
        if let Some(WaitIndex { index, wait }) = wait {
            url.push_str(&format!("?index={}&wait={}s", index, wait.as_secs()));
        }
        let uri = url
            .parse::<Uri>()
            .map_err(|e| CatalogError::Address(e.to_string()))?;

        let mut request = Request::get(uri);
        if let Some(token) = &self.token {
            request = request.header(CONSUL_TOKEN_HEADER, token);
        }
        let request = request
            .body(Body::empty())
            .map_err(|e| CatalogError::Address(e.to_string()))?;

        let response = self.client.request(request).await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()));
        }

        let index = response
            .headers()
            .get(CONSUL_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let body = hyper::body::to_bytes(response.into_body()).await?;
        let services = serde_json::from_slice(&body)?;
        Ok(CatalogResponse { services, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_service_decodes_consul_fields() {
        let body = r#"[{
            "Node": "node-1",
            "Address": "10.0.0.1",
            "ServiceName": "hello",
            "ServiceAddress": "10.0.0.2",
            "ServicePort": 20001
        }]"#;

        let services: Vec<CatalogService> = serde_json::from_str(body).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].service_address, "10.0.0.2");
        assert_eq!(services[0].service_port, 20001);
    }
}
