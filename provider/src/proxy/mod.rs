//! The invocation data plane: resolve, select, guard, call, mirror.

pub(crate) mod balance;
pub(crate) mod breaker;
pub(crate) mod client;
pub(crate) mod dispatcher;

pub(crate) use self::{
    client::ProxyClient,
    dispatcher::{DispatchError, Dispatcher, DispatcherConfig},
};

use crate::handlers::{self, App};
use hyper::{Body, Method, Request, Response, StatusCode};
use tracing::error;

/// Handles `POST /function/<name>`: resolves the function's endpoints and
/// hands the buffered request to the dispatcher, mirroring whatever comes
/// back.
pub(crate) async fn invoke(app: &App, function: &str, request: Request<Body>) -> Response<Body> {
    app.stats.incr("proxy.called", &[]);

    if request.method() != Method::POST {
        app.stats.incr("proxy.error.badrequest", &[]);
        return handlers::text_response(StatusCode::BAD_REQUEST, "functions are invoked with POST");
    }

    let endpoints = match app.resolver.resolve(function).await {
        Ok(endpoints) => endpoints,
        Err(error) => {
            error!(%function, %error, "endpoint resolution failed");
            app.stats.incr("proxy.error.notfound", &[]);
            return handlers::text_response(StatusCode::NOT_FOUND, &error.to_string());
        }
    };
    if endpoints.is_empty() {
        app.stats.incr("proxy.error.notfound", &[]);
        return handlers::empty_response(StatusCode::NOT_FOUND);
    }

    let (parts, body) = request.into_parts();
    let body = match hyper::body::to_bytes(body).await {
        Ok(body) => body,
        Err(error) => {
            app.stats.incr("proxy.error.badrequest", &[]);
            return handlers::text_response(StatusCode::BAD_REQUEST, &error.to_string());
        }
    };

    let dispatched = app
        .dispatcher
        .dispatch(function, &endpoints, parts.uri.query(), body, &parts.headers)
        .await;
    match dispatched {
        Ok(upstream) => {
            app.stats.incr("proxy.success", &[]);
            let mut response = Response::builder().status(upstream.status);
            if let Some(headers) = response.headers_mut() {
                // First value per name, mirroring what the upstream sent.
                for name in upstream.headers.keys() {
                    if let Some(value) = upstream.headers.get(name) {
                        headers.insert(name.clone(), value.clone());
                    }
                }
            }
            response.body(Body::from(upstream.body)).unwrap()
        }
        Err(DispatchError::NoEndpoints) => {
            app.stats.incr("proxy.error.notfound", &[]);
            handlers::empty_response(StatusCode::NOT_FOUND)
        }
        Err(error) => {
            error!(%function, %error, "dispatch failed");
            app.stats.incr("proxy.error.internalerror", &[]);
            handlers::text_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}
