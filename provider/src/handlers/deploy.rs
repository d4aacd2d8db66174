use super::{empty_response, text_response, App};
use faas_provider_core::FunctionDeployment;
use faas_provider_nomad::job_from_deployment;
use hyper::{Body, Request, Response, StatusCode};
use tracing::{error, info};

/// Deploys or updates a function by registering its job.
///
/// Updates reuse the same job id; the resolver cache is refreshed by
/// discovery pushes as replicas roll, not evicted here.
pub(crate) async fn handle(app: &App, request: Request<Body>) -> Response<Body> {
    app.stats.incr("deploy.called", &[]);

    let body = match hyper::body::to_bytes(request.into_body()).await {
        Ok(body) => body,
        Err(error) => {
            app.stats.incr("deploy.error.badrequest", &[]);
            return text_response(StatusCode::BAD_REQUEST, &error.to_string());
        }
    };
    let deployment: FunctionDeployment = match serde_json::from_slice(&body) {
        Ok(deployment) => deployment,
        Err(error) => {
            error!(%error, "malformed deployment request");
            app.stats.incr("deploy.error.badrequest", &[]);
            return empty_response(StatusCode::BAD_REQUEST);
        }
    };

    let job = job_from_deployment(&deployment, &app.translate);
    match app.jobs.register(&job).await {
        Ok(response) => {
            info!(
                function = %deployment.service,
                evaluation = %response.eval_id,
                "function deployed"
            );
            app.stats
                .gauge("deploy.count", 1.0, &[("job", &deployment.service)]);
            app.stats.incr("deploy.success", &[]);
            empty_response(StatusCode::OK)
        }
        Err(error) => {
            error!(function = %deployment.service, %error, "job registration failed");
            app.stats.incr("deploy.error.register", &[]);
            text_response(StatusCode::BAD_REQUEST, &error.to_string())
        }
    }
}
