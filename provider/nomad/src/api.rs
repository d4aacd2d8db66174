use crate::{
    job::{AllocationListStub, Job, JobListStub, JobRegisterResponse},
    tls::{TlsError, TlsSettings},
};
use hyper::{client::HttpConnector, Body, Method, Request, StatusCode, Uri};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

const NOMAD_TOKEN_HEADER: &str = "x-nomad-token";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("orchestrator request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid orchestrator address: {0}")]
    Address(String),

    #[error("orchestrator returned status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("malformed orchestrator response: {0}")]
    Body(#[from] serde_json::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// The slice of the Nomad job API the provider depends on.
#[async_trait::async_trait]
pub trait Jobs: Send + Sync {
    async fn register(&self, job: &Job) -> Result<JobRegisterResponse, ApiError>;

    /// Returns `None` when no job with `job_id` exists.
    async fn info(&self, job_id: &str) -> Result<Option<Job>, ApiError>;

    async fn list(&self, prefix: &str) -> Result<Vec<JobListStub>, ApiError>;

    /// Returns the id of the evaluation created for the stop.
    async fn deregister(&self, job_id: &str, purge: bool) -> Result<String, ApiError>;

    async fn allocations(
        &self,
        job_id: &str,
        all: bool,
    ) -> Result<Vec<AllocationListStub>, ApiError>;
}

/// Job API client over Nomad's HTTP surface.
pub struct HttpJobs {
    client: hyper::Client<hyper_rustls::HttpsConnector<HttpConnector>>,
    base: String,
    region: Option<String>,
    token: Option<String>,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    #[serde(rename = "Job")]
    job: &'a Job,
}

#[derive(Default, serde::Deserialize)]
#[serde(default)]
struct DeregisterResponse {
    #[serde(rename = "EvalID")]
    eval_id: String,
}

// === impl HttpJobs ===

impl HttpJobs {
    pub fn new(
        address: &str,
        region: Option<String>,
        token: Option<String>,
        tls: &TlsSettings,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: hyper::Client::builder().build(tls.connector()?),
            base: address.trim_end_matches('/').to_string(),
            region,
            token,
        })
    }

    fn uri(&self, path: &str, query: &[(&str, String)]) -> Result<Uri, ApiError> {
        let mut url = format!("{}{}", self.base, path);
        let mut params = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();
        if let Some(region) = &self.region {
            params.push(format!("region={region}"));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url.parse().map_err(|_| ApiError::Address(url))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        uri: Uri,
        body: Option<Vec<u8>>,
    ) -> Result<Option<T>, ApiError> {
        debug!(%method, %uri, "orchestrator request");
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = &self.token {
            request = request.header(NOMAD_TOKEN_HEADER, token);
        }
        let request = request
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .map_err(|e| ApiError::Address(e.to_string()))?;

        let response = self.client.request(request).await?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ApiError::UnexpectedStatus {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait::async_trait]
impl Jobs for HttpJobs {
    async fn register(&self, job: &Job) -> Result<JobRegisterResponse, ApiError> {
        let body = serde_json::to_vec(&RegisterRequest { job })?;
        let uri = self.uri("/v1/jobs", &[])?;
        self.request(Method::PUT, uri, Some(body))
            .await?
            .ok_or(ApiError::UnexpectedStatus {
                status: StatusCode::NOT_FOUND,
                body: String::new(),
            })
    }

    async fn info(&self, job_id: &str) -> Result<Option<Job>, ApiError> {
        let uri = self.uri(&format!("/v1/job/{job_id}"), &[])?;
        self.request(Method::GET, uri, None).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<JobListStub>, ApiError> {
        let uri = self.uri("/v1/jobs", &[("prefix", prefix.to_string())])?;
        Ok(self
            .request(Method::GET, uri, None)
            .await?
            .unwrap_or_default())
    }

    async fn deregister(&self, job_id: &str, purge: bool) -> Result<String, ApiError> {
        let uri = self.uri(&format!("/v1/job/{job_id}"), &[("purge", purge.to_string())])?;
        let response: Option<DeregisterResponse> = self.request(Method::DELETE, uri, None).await?;
        response
            .map(|r| r.eval_id)
            .ok_or(ApiError::UnexpectedStatus {
                status: StatusCode::NOT_FOUND,
                body: String::new(),
            })
    }

    async fn allocations(
        &self,
        job_id: &str,
        all: bool,
    ) -> Result<Vec<AllocationListStub>, ApiError> {
        let uri = self.uri(
            &format!("/v1/job/{job_id}/allocations"),
            &[("all", all.to_string())],
        )?;
        Ok(self
            .request(Method::GET, uri, None)
            .await?
            .unwrap_or_default())
    }
}
