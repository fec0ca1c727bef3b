pub mod auth;
pub mod events;
pub mod health;

use axum::Router;

use super::AppState;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(events::routes(state.clone()))
        .merge(auth::routes(state))
}
