use axum::{extract::State, routing::post, Json, Router};

use crate::agent::{IncomingMessage, Reply};
use crate::server::AppState;
use crate::Result;

async fn message(State(state): State<AppState>, Json(event): Json<IncomingMessage>) -> Result<Json<Reply>> {
    let reply = state.router.handle(event).await?;
    Ok(Json(reply))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/events/message", post(message))
        .with_state(state)
}
