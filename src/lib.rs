//! dirgate authenticates users against replicated directory servers,
//! failing over to the next server when one does not answer.

#![forbid(unsafe_code)]
pub mod config;
pub mod directory;
pub mod error;
mod middleware;
mod router;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use directory::tls::{
    AcceptAnyCertificate, CertificateValidator, WebPkiValidator,
};
use directory::{Directory, DirectoryError, Ldap3Connector, PreferredServers};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    authorization: Option<&str>,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub directory: Directory,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Every server may time out in turn.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let directory_router = Router::new()
        // `POST /directory/test` goes to `directory::test`.
        .route("/test", post(router::directory::test))
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::require_diagnostics_token,
        ));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        .nest("/directory", directory_router)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub fn initialize_state(
    config: config::Configuration,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, DirectoryError> {
    let validator: Arc<dyn CertificateValidator> = if config.tls.skip_verify {
        tracing::warn!(
            "`tls.skip_verify` is set, directory certificates are not checked"
        );
        Arc::new(AcceptAnyCertificate)
    } else {
        Arc::new(WebPkiValidator)
    };

    let roots = directory::tls::root_store(config.tls.ca_file.as_deref())?;
    let connector = Arc::new(Ldap3Connector::new(roots, validator));

    if config.directory.is_none() && config.tenants.is_empty() {
        tracing::warn!("no `directory` nor `tenants` entry on `config.yaml` file");
    }

    Ok(AppState {
        config: Arc::new(config),
        directory: Directory::new(connector, PreferredServers::default()),
        metrics,
    })
}
