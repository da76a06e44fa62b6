//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::ServerError;
use crate::error::Result;

const BEARER: &str = "Bearer ";

/// Middleware guarding the connectivity check.
///
/// The route does not exist unless `diagnostics.token` is set.
pub async fn require_diagnostics_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let Some(expected) = state.config.diagnostics.token.as_deref() else {
        return Err(ServerError::NotFound);
    };

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER))
        .ok_or(ServerError::Unauthorized)?;

    if !constant_time_eq::constant_time_eq(token.as_bytes(), expected.as_bytes())
    {
        tracing::warn!("connectivity check refused: invalid token");
        return Err(ServerError::Unauthorized);
    }

    Ok(next.run(req).await)
}
