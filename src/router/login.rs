use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::directory::{AuthResult, RejectReason};
use crate::error::{Result, ServerError};
use crate::router::Valid;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Username must contain between 1 and 255 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Password must contain between 1 and 255 characters."
    ))]
    pub password: String,
    pub tenant: Option<String>,
}

/// Handler to authenticate against the tenant directory.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<AuthResult>> {
    let tenant = body.tenant.as_deref();
    let settings = state.config.settings_for(tenant).ok_or_else(|| {
        ServerError::UnknownTenant(tenant.unwrap_or_default().to_owned())
    })?;

    let result = state
        .directory
        .authenticate(settings, &body.username, &body.password, tenant)
        .await?;

    match result.rejection {
        None => Ok(Json(result)),
        Some(RejectReason::InvalidCredentials) => {
            Err(ServerError::InvalidCredentials)
        },
        Some(RejectReason::Unavailable) => Err(ServerError::ServiceUnavailable),
    }
}
