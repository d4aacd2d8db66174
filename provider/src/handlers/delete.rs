use super::{empty_response, text_response, App};
use faas_provider_core::DeleteFunctionRequest;
use faas_provider_nomad::JOB_PREFIX;
use hyper::{Body, Request, Response, StatusCode};
use tracing::{error, info};

/// Deregisters a function's job and drops its cached endpoints.
///
/// The discovery subscription is removed as part of the eviction, before
/// the cache slot is cleared, so a late watch event cannot resurrect it.
pub(crate) async fn handle(app: &App, request: Request<Body>) -> Response<Body> {
    app.stats.incr("delete.called", &[]);

    let body = match hyper::body::to_bytes(request.into_body()).await {
        Ok(body) => body,
        Err(error) => {
            app.stats.incr("delete.error.badrequest", &[]);
            return text_response(StatusCode::BAD_REQUEST, &error.to_string());
        }
    };
    let request: DeleteFunctionRequest = match serde_json::from_slice::<DeleteFunctionRequest>(&body) {
        Ok(request) if !request.function_name.is_empty() => request,
        Ok(_) | Err(_) => {
            app.stats.incr("delete.error.badrequest", &[]);
            return empty_response(StatusCode::BAD_REQUEST);
        }
    };

    info!(function = %request.function_name, "deleting function");
    let job_id = format!("{}{}", JOB_PREFIX, request.function_name);
    match app.jobs.deregister(&job_id, false).await {
        Ok(_) => {
            app.resolver.evict(&request.function_name).await;
            app.stats
                .gauge("deploy.count", 0.0, &[("job", &request.function_name)]);
            app.stats
                .incr("delete.success", &[("job", &request.function_name)]);
            empty_response(StatusCode::OK)
        }
        Err(error) => {
            error!(function = %request.function_name, %error, "deregistration failed");
            app.stats.incr("delete.error.deregister", &[]);
            text_response(StatusCode::BAD_REQUEST, &error.to_string())
        }
    }
}
