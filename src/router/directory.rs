//! Connectivity check of every directory server.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use crate::directory::ServerReport;
use crate::error::{Result, ServerError};
use crate::router::Valid;

#[derive(Debug, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, max = 255))]
    pub username: String,
    #[validate(length(min = 1, max = 255))]
    pub password: String,
    pub tenant: Option<String>,
}

/// Bind on each server of the tenant and report every outcome.
pub async fn test(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<ServerReport>> {
    let tenant = body.tenant.as_deref();
    let settings = state.config.settings_for(tenant).ok_or_else(|| {
        ServerError::UnknownTenant(tenant.unwrap_or_default().to_owned())
    })?;

    let report = state
        .directory
        .test_servers(settings, &body.username, &body.password)
        .await?;

    Ok(Json(report))
}
