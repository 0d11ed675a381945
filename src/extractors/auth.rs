use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;

use crate::{
    auth::TokenType,
    models::{Role, User},
    AppError, AppResult, AppState,
};

/// The caller behind a valid access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin role required".to_string()))
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AppError::Unauthorized(
                        "Authentication credentials were not provided".to_string(),
                    )
                })?;

        let claims = state
            .jwt
            .validate(bearer.token(), TokenType::Access)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected access token");
                AppError::Unauthorized("Token is invalid or expired".to_string())
            })?;

        let user_id = claims
            .user_id()
            .ok_or_else(|| AppError::Unauthorized("Token is invalid or expired".to_string()))?;

        // Role and activation are re-read so a deactivated account loses access
        // before its token expires.
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
            .bind(user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id, "Database query failed");
                AppError::Database(e)
            })?
            .filter(|u| u.is_active)
            .ok_or_else(|| {
                tracing::warn!(user_id, "Token for missing or inactive user");
                AppError::Unauthorized("User not found or inactive".to_string())
            })?;

        Ok(AuthenticatedUser {
            user_id: user.id,
            role: user.role,
        })
    }
}
