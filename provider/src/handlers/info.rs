use super::{json_response, App};
use faas_provider_core::{InfoResponse, ProviderVersion};
use hyper::{Body, Response, StatusCode};

const ORCHESTRATION: &str = "nomad";

/// Identifies the provider and its version.
pub(crate) fn handle(app: &App) -> Response<Body> {
    app.stats.incr("info.called", &[]);
    json_response(
        StatusCode::OK,
        &InfoResponse {
            orchestration: ORCHESTRATION.to_string(),
            version: ProviderVersion {
                release: env!("CARGO_PKG_VERSION").to_string(),
                sha: String::new(),
            },
        },
    )
}
