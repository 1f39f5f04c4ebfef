use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::content::time_ago;
use crate::db::models::Notification;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub time_ago: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/notifications", get(list_notifications))
}

async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<NotificationView>>> {
    let now = Utc::now();
    let views = state
        .content
        .notifications_for(&user.id)?
        .into_iter()
        .map(|notification| NotificationView {
            time_ago: time_ago(notification.created_at, now),
            notification,
        })
        .collect();
    Ok(Json(views))
}
