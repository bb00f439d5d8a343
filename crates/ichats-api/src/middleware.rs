use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use ichats_core::auth::{self, Identity};
use ichats_core::AppState;

use crate::error::ApiError;

/// Caller identity for REST routes, verified the same way as the
/// realtime handshake.
pub struct AuthUser {
    pub identity: Identity,
}

impl AuthUser {
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let identity = auth::verify_identity(token, &state.config.jwt_secret).map_err(|e| {
            tracing::debug!("Rejected request credential: {}", e);
            ApiError::Unauthorized
        })?;

        Ok(AuthUser { identity })
    }
}
