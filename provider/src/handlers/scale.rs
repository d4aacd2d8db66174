use super::{empty_response, text_response, App};
use faas_provider_core::ScaleServiceRequest;
use faas_provider_nomad::JOB_PREFIX;
use hyper::{Body, Request, Response, StatusCode};
use tracing::{error, info};

/// Scales a function by rewriting its task group count and re-registering
/// the job.
pub(crate) async fn handle(app: &App, function: &str, request: Request<Body>) -> Response<Body> {
    app.stats.incr("replicationwriter.called", &[]);

    let mut job = match app.jobs.info(&format!("{JOB_PREFIX}{function}")).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            app.stats.incr("replicationwriter.error.notfound", &[]);
            return empty_response(StatusCode::NOT_FOUND);
        }
        Err(error) => {
            error!(%function, %error, "failed to fetch job");
            app.stats.incr("replicationwriter.error.notfound", &[]);
            return text_response(StatusCode::NOT_FOUND, &error.to_string());
        }
    };

    let body = match hyper::body::to_bytes(request.into_body()).await {
        Ok(body) => body,
        Err(error) => {
            app.stats.incr("replicationwriter.error.badrequest", &[]);
            return text_response(StatusCode::BAD_REQUEST, &error.to_string());
        }
    };
    let scale: ScaleServiceRequest = match serde_json::from_slice::<ScaleServiceRequest>(&body) {
        Ok(scale) if !scale.service_name.is_empty() => scale,
        Ok(_) | Err(_) => {
            app.stats.incr("replicationwriter.error.badrequest", &[]);
            return empty_response(StatusCode::BAD_REQUEST);
        }
    };

    info!(function = %scale.service_name, replicas = scale.replicas, "scaling function");
    match job.task_groups.first_mut() {
        Some(group) => group.count = scale.replicas as i64,
        None => {
            app.stats.incr("replicationwriter.error.internalerror", &[]);
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "job has no task group");
        }
    }

    match app.jobs.register(&job).await {
        Ok(_) => {
            app.stats.gauge(
                "deploy.count",
                scale.replicas as f64,
                &[("job", &scale.service_name)],
            );
            app.stats.incr("replicationwriter.success", &[]);
            empty_response(StatusCode::OK)
        }
        Err(error) => {
            error!(function = %scale.service_name, %error, "failed to update job");
            app.stats.incr("replicationwriter.error.internalerror", &[]);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}
