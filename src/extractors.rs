use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::cookies::get_cookie_value;
use crate::auth::SessionError;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::UserError;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub profile_pic: Option<String>,
}

/// Extractor that requires authentication.
/// Returns 401 if no valid session found. Storage failures are logged and
/// also surface as 401, so callers never see why a session was refused.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie_value(&parts.headers, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let user_id = match state.sessions.validate_session(token) {
            Ok(user_id) => user_id,
            Err(SessionError::Invalid) => return Err(AppError::Unauthorized),
            Err(e) => {
                tracing::error!("Session lookup failed: {}", e);
                return Err(AppError::Unauthorized);
            }
        };

        match state.users.get(&user_id) {
            Ok(user) => Ok(CurrentUser {
                id: user.id,
                username: user.username,
                profile_pic: user.profile_pic,
            }),
            Err(UserError::NotFound) => Err(AppError::Unauthorized),
            Err(e) => {
                tracing::error!("User lookup failed: {}", e);
                Err(AppError::Unauthorized)
            }
        }
    }
}

/// Optional user extractor; returns None instead of 401 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}
