use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{chat, health, slack, ws};

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(chat::router())
        .merge(ws::router())
        .merge(slack::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
