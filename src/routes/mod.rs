pub mod auth;
pub mod categories;
pub mod comments;
pub mod notifications;
pub mod posts;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full JSON API with request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(categories::router())
        .merge(notifications::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
