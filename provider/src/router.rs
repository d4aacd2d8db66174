use crate::{
    handlers::{self, App},
    proxy,
};
use hyper::{header, Body, Method, Request, Response, StatusCode};
use std::sync::Arc;

/// Dispatches the provider's HTTP surface.
///
/// Paths are matched on their segments; the function name for scale, read,
/// and invoke is the segment following the route prefix.
pub(crate) async fn handle(app: Arc<App>, request: Request<Body>) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.first() == Some(&"system") {
        if let Some(auth) = &app.basic_auth {
            if !auth.matches(request.headers().get(header::AUTHORIZATION)) {
                return Response::builder()
                    .status(StatusCode::UNAUTHORIZED)
                    .header(header::WWW_AUTHENTICATE, "Basic realm=\"faas-nomad\"")
                    .body(Body::default())
                    .unwrap();
            }
        }
    }

    match (method, segments.as_slice()) {
        (Method::GET, ["healthz"]) => handlers::text_response(StatusCode::OK, "OK"),

        (Method::POST, ["system", "functions"]) | (Method::PUT, ["system", "functions"]) => {
            handlers::deploy::handle(&app, request).await
        }
        (Method::DELETE, ["system", "functions"]) => handlers::delete::handle(&app, request).await,
        (Method::GET, ["system", "functions"]) => handlers::list::handle(&app).await,

        (Method::POST, ["system", "scale-function", name]) => {
            handlers::scale::handle(&app, name, request).await
        }
        (Method::GET, ["system", "function", name]) => handlers::read::handle(&app, name).await,
        (Method::GET, ["system", "info"]) => handlers::info::handle(&app),
        (_, ["system", "secrets"]) => handlers::secrets::handle(&app, request).await,

        (_, ["function", name, ..]) => proxy::invoke(&app, name, request).await,
        (_, ["function"]) => handlers::text_response(StatusCode::BAD_REQUEST, "no function name"),

        _ => handlers::empty_response(StatusCode::NOT_FOUND),
    }
}
