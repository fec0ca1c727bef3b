//! Browser-facing OAuth endpoints
//!
//! Chat replies link users to `login` and `logout`; the provider sends them
//! back to `callback`.

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::Error;
use crate::server::AppState;
use crate::Result;

#[derive(Debug, Deserialize)]
struct UserQuery {
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
}

fn require_provider(state: &AppState, provider: &str) -> Result<()> {
    if state.flow.supports(provider) {
        Ok(())
    } else {
        Err(Error::UnsupportedProvider(provider.to_string()))
    }
}

async fn login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Redirect> {
    require_provider(&state, &provider)?;
    let url = state.flow.begin_login(&query.user_id, &provider)?;
    Ok(Redirect::to(&url))
}

async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<String> {
    require_provider(&state, &provider)?;

    if let Some(error) = query.error {
        warn!("Provider {} returned error: {}", provider, error);
        if let Some(oauth_state) = &query.state {
            state.flow.fail_login(oauth_state)?;
        }
        return Err(Error::BadRequest(format!("Authorization failed: {error}")));
    }

    let (Some(oauth_state), Some(code)) = (query.state, query.code) else {
        return Err(Error::BadRequest("Missing state or code.".to_string()));
    };

    let outcome = state.flow.complete_login(&provider, &oauth_state, &code).await?;
    Ok(outcome.message())
}

async fn logout(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<String> {
    require_provider(&state, &provider)?;
    state.flow.logout(&query.user_id, &provider)?;
    Ok("Signed out. You can close this window.".to_string())
}

async fn status(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>> {
    require_provider(&state, &provider)?;
    let signed_in = state.flow.status(&query.user_id, &provider)?;
    Ok(Json(json!({ "signed_in": signed_in })))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/{provider}/login", get(login))
        .route("/auth/{provider}/callback", get(callback))
        .route("/auth/{provider}/logout", get(logout))
        .route("/auth/{provider}/status", get(status))
        .with_state(state)
}
