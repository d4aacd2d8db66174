//! Control-plane handlers for the gateway's provider contract.

pub(crate) mod delete;
pub(crate) mod deploy;
pub(crate) mod info;
pub(crate) mod list;
pub(crate) mod read;
pub(crate) mod scale;
pub(crate) mod secrets;


use crate::{proxy::Dispatcher, vault::VaultClient};
use base64::Engine as _;
use faas_provider_core::{Function, Resolver, Stats};
use faas_provider_nomad::{ConfigValue, Job, Jobs, TranslateConfig, JOB_PREFIX};
use hyper::{header::HeaderValue, Body, Response, StatusCode};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path, sync::Arc};

/// Handler dependencies, built once at startup and threaded through the
/// router.
pub(crate) struct App {
    pub jobs: Arc<dyn Jobs>,
    pub resolver: Arc<dyn Resolver>,
    pub dispatcher: Arc<Dispatcher>,
    pub stats: Arc<dyn Stats>,
    pub vault: Option<Arc<VaultClient>>,
    pub translate: TranslateConfig,
    pub basic_auth: Option<BasicAuth>,
}

/// Credentials guarding the `/system` surface.
#[derive(Clone, Debug)]
pub(crate) struct BasicAuth {
    pub user: String,
    pub password: String,
}

// === impl BasicAuth ===

impl BasicAuth {
    /// Reads `basic-auth-user` / `basic-auth-password` from a secret mount.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let user = std::fs::read_to_string(path.join("basic-auth-user"))?;
        let password = std::fs::read_to_string(path.join("basic-auth-password"))?;
        Ok(Self {
            user: user.trim().to_string(),
            password: password.trim().to_string(),
        })
    }

    pub fn matches(&self, header: Option<&HeaderValue>) -> bool {
        let Some(value) = header.and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
            return false;
        };
        decoded == format!("{}:{}", self.user, self.password).into_bytes()
    }
}

pub(crate) fn empty_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .unwrap()
}

pub(crate) fn text_response(status: StatusCode, body: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap(),
        Err(_) => empty_response(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Projects a job back into the gateway's function shape, stripping the job
/// prefix from the name.
pub(crate) fn function_summary(job: &Job, available_replicas: u64) -> Function {
    let group = job.task_groups.first();
    let task = group.and_then(|g| g.tasks.first());
    Function {
        name: job
            .id
            .strip_prefix(JOB_PREFIX)
            .unwrap_or(&job.id)
            .to_string(),
        image: task
            .and_then(|t| t.config.get("image"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        invocation_count: 0,
        replicas: group.map(|g| g.count.max(0) as u64).unwrap_or(0),
        available_replicas,
        labels: task.map(|t| parse_labels(&t.config)),
        annotations: if job.meta.is_empty() {
            None
        } else {
            Some(job.meta.clone())
        },
    }
}

/// Flattens the docker driver's list-of-singleton-maps label shape.
fn parse_labels(config: &BTreeMap<String, ConfigValue>) -> BTreeMap<String, String> {
    config
        .get("labels")
        .and_then(|v| v.as_list())
        .map(|labels| {
            labels
                .iter()
                .filter_map(|entry| entry.as_map())
                .flat_map(|map| map.iter())
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
