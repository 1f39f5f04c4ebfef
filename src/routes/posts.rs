use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::content::{time_ago, NewPost, PostFilter};
use crate::db::models::{Comment, Post};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::reactions::{Polarity, ReactionCounts, Target};
use crate::state::AppState;

#[derive(Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub time_ago: String,
}

#[derive(Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostView,
    pub comment_list: Vec<Comment>,
    /// The viewer's own reaction, when signed in.
    pub reaction: Option<Polarity>,
}

#[derive(Deserialize)]
pub struct ReactRequest {
    pub like: bool,
}

#[derive(Serialize)]
pub struct ReactResponse {
    #[serde(flatten)]
    pub counts: ReactionCounts,
    pub reaction: Option<Polarity>,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Serialize)]
pub struct Created {
    pub id: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post))
        .route("/posts/{id}/react", post(react))
        .route("/posts/{id}/comments", post(add_comment))
}

fn view(post: Post) -> PostView {
    let time_ago = time_ago(post.created_at, Utc::now());
    PostView { post, time_ago }
}

async fn list_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
) -> AppResult<Json<Vec<PostView>>> {
    let posts = state.content.list_posts(&filter)?;
    Ok(Json(posts.into_iter().map(view).collect()))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(new_post): Json<NewPost>,
) -> AppResult<Response> {
    let id = state.content.create_post(&user.id, &new_post)?;
    Ok((StatusCode::CREATED, Json(Created { id })).into_response())
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    maybe_user: MaybeUser,
) -> AppResult<Json<PostDetail>> {
    let post = state.content.get_post(id)?;
    let comments = state.content.list_comments(id)?;
    let reaction = match maybe_user.0 {
        Some(user) => state.ledger.reaction_of(&user.id, Target::Post(id))?,
        None => None,
    };

    Ok(Json(PostDetail {
        post: view(post),
        comment_list: comments,
        reaction,
    }))
}

async fn react(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: CurrentUser,
    Json(request): Json<ReactRequest>,
) -> AppResult<Json<ReactResponse>> {
    let counts = state.ledger.set_post_reaction(&user.id, id, request.like)?;
    let reaction = state.ledger.reaction_of(&user.id, Target::Post(id))?;
    Ok(Json(ReactResponse { counts, reaction }))
}

async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: CurrentUser,
    Json(request): Json<CommentRequest>,
) -> AppResult<Response> {
    let comment_id = state.content.add_comment(&user.id, id, &request.content)?;
    Ok((StatusCode::CREATED, Json(Created { id: comment_id })).into_response())
}
