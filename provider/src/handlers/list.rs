use super::{function_summary, json_response, text_response, App};
use faas_provider_nomad::JOB_PREFIX;
use hyper::{Body, Response, StatusCode};
use tracing::{error, warn};

/// Lists deployed functions: every prefixed job that is running or pending,
/// with the prefix stripped from its name.
pub(crate) async fn handle(app: &App) -> Response<Body> {
    app.stats.incr("reader.called", &[]);

    let stubs = match app.jobs.list(JOB_PREFIX).await {
        Ok(stubs) => stubs,
        Err(error) => {
            error!(%error, "failed to list jobs");
            app.stats.incr("reader.error.internalerror", &[]);
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string());
        }
    };

    let mut functions = Vec::with_capacity(stubs.len());
    for stub in stubs {
        if stub.status != "running" && stub.status != "pending" {
            continue;
        }
        match app.jobs.info(&stub.id).await {
            Ok(Some(job)) => functions.push(function_summary(&job, 0)),
            Ok(None) => {}
            Err(error) => warn!(job = %stub.id, %error, "skipping unreadable job"),
        }
    }

    app.stats.incr("reader.success", &[]);
    json_response(StatusCode::OK, &functions)
}
