use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::Category;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NewCategory {
    pub name: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/categories", get(list_categories).post(create_category))
}

async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(state.content.list_categories()?))
}

async fn create_category(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(request): Json<NewCategory>,
) -> AppResult<Response> {
    let category = state.content.create_category(&request.name)?;
    Ok((StatusCode::CREATED, Json(category)).into_response())
}
