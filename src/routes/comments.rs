use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::reactions::Target;
use crate::routes::posts::{CommentRequest, ReactRequest, ReactResponse};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments/{id}", put(edit_comment).delete(delete_comment))
        .route("/comments/{id}/react", post(react))
}

async fn edit_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: CurrentUser,
    Json(request): Json<CommentRequest>,
) -> AppResult<StatusCode> {
    state.content.edit_comment(&user.id, id, &request.content)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: CurrentUser,
) -> AppResult<StatusCode> {
    state.content.delete_comment(&user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn react(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: CurrentUser,
    Json(request): Json<ReactRequest>,
) -> AppResult<Json<ReactResponse>> {
    let counts = state
        .ledger
        .set_comment_reaction(&user.id, id, request.like)?;
    let reaction = state.ledger.reaction_of(&user.id, Target::Comment(id))?;
    Ok(Json(ReactResponse { counts, reaction }))
}
