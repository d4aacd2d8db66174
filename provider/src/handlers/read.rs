use super::{function_summary, json_response, text_response, App};
use faas_provider_nomad::JOB_PREFIX;
use hyper::{Body, Response, StatusCode};
use tracing::error;

const RUNNING: &str = "running";

/// Reports a single function with its live availability, counted from the
/// running task states across all of the job's allocations.
pub(crate) async fn handle(app: &App, function: &str) -> Response<Body> {
    app.stats.incr("replicationreader.called", &[]);

    let job = match app.jobs.info(&format!("{JOB_PREFIX}{function}")).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            app.stats.incr("replicationreader.error.notfound", &[]);
            return super::empty_response(StatusCode::NOT_FOUND);
        }
        Err(error) => {
            error!(%function, %error, "failed to fetch job");
            app.stats.incr("replicationreader.error.notfound", &[]);
            return text_response(StatusCode::NOT_FOUND, &error.to_string());
        }
    };

    let allocations = match app.jobs.allocations(&job.id, true).await {
        Ok(allocations) => allocations,
        Err(error) => {
            error!(%function, %error, "failed to fetch allocations");
            app.stats.incr("replicationreader.error.internalerror", &[]);
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string());
        }
    };
    let available = allocations
        .iter()
        .flat_map(|allocation| allocation.task_states.values())
        .filter(|task| task.state == RUNNING)
        .count() as u64;

    app.stats.incr("replicationreader.success", &[]);
    json_response(StatusCode::OK, &function_summary(&job, available))
}
