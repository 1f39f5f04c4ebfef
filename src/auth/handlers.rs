use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::cookies::{clear_session_cookie, get_cookie_value, session_cookie};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::users::NewUser;

#[derive(Deserialize)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub id: String,
    pub username: String,
    pub profile_pic: Option<String>,
}

/// Password hashing is deliberately slow; keep it off the async workers.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {}", e)))?
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(new_user): Json<NewUser>,
) -> AppResult<Response> {
    let users = state.users.clone();
    let user: User = blocking(move || Ok(users.register(&new_user)?)).await?;

    Ok((StatusCode::CREATED, Json(user)).into_response())
}

/// POST /auth/signin: verifies credentials and issues the session cookie.
pub async fn signin(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> AppResult<Response> {
    let users = state.users.clone();
    let user = blocking(move || Ok(users.authenticate(&request.username, &request.password)?))
        .await?;

    let token = state.sessions.create_session(&user.id)?;
    tracing::info!(user_id = %user.id, "User signed in");

    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.cookie_max_age_secs(),
    );

    Ok(([(header::SET_COOKIE, cookie)], Json(user)).into_response())
}

/// POST /auth/signout: always clears the cookie, even for a stale token.
pub async fn signout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;

    if let Some(token) = get_cookie_value(&headers, cookie_name) {
        state.sessions.delete_session(token)?;
        tracing::info!("User signed out");
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie(cookie_name))],
    )
        .into_response())
}

/// GET /auth/me
pub async fn me(user: CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.id,
        username: user.username,
        profile_pic: user.profile_pic,
    })
}
