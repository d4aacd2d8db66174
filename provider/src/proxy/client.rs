use bytes::Bytes;
use hyper::{client::HttpConnector, header::HeaderMap, Body, Method, Request, StatusCode, Uri};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// A buffered upstream response, ready to be mirrored to the caller or
/// replayed through the retrier.
#[derive(Clone, Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct CallError(pub String);

/// Performs one POST to a resolved endpoint.
#[async_trait::async_trait]
pub trait UpstreamCall: Send + Sync {
    async fn call(
        &self,
        address: &str,
        query: Option<&str>,
        body: Bytes,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse, CallError>;
}

/// HTTP client for function invocations.
///
/// Keep-alives are disabled and the idle window is short so broken upstream
/// connections do not accumulate across a changing replica set; the dial
/// timeout matches the function timeout.
pub struct ProxyClient {
    client: hyper::Client<hyper_rustls::HttpsConnector<HttpConnector>>,
}

// === impl ProxyClient ===

impl ProxyClient {
    pub fn new(timeout: Duration) -> Self {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(Some(timeout));
        http.set_nodelay(true);
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = hyper::Client::builder()
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::from_millis(120))
            .build(https);
        Self { client }
    }
}

#[async_trait::async_trait]
impl UpstreamCall for ProxyClient {
    async fn call(
        &self,
        address: &str,
        query: Option<&str>,
        body: Bytes,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse, CallError> {
        let url = match query {
            Some(query) if !query.is_empty() => format!("{address}?{query}"),
            _ => address.to_string(),
        };
        let uri = url
            .parse::<Uri>()
            .map_err(|e| CallError(format!("invalid endpoint {url}: {e}")))?;

        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::from(body))
            .map_err(|e| CallError(e.to_string()))?;
        for (name, value) in headers {
            // The transport owns framing and authority.
            if *name == hyper::header::HOST || *name == hyper::header::CONTENT_LENGTH {
                continue;
            }
            request.headers_mut().append(name.clone(), value.clone());
        }

        let started = Instant::now();
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| CallError(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = hyper::body::to_bytes(body)
            .await
            .map_err(|e| CallError(e.to_string()))?;
        debug!(
            %address,
            status = %parts.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream call finished"
        );

        Ok(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}
