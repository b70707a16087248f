use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use config_entry::get_config_entry;
use rkboot::EntryRegistry;

const DEFAULT_GREETING: &str = "Hello";

#[derive(Debug, Deserialize)]
pub struct GreeterQuery {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct GreeterResponse {
    pub message: String,
}

#[derive(Clone)]
pub struct GreeterState {
    greeting: Arc<str>,
}

impl GreeterState {
    /// Greeting word from the `greeter` config entry when one is declared.
    pub fn from_registry(registry: &EntryRegistry) -> Self {
        let greeting = get_config_entry(registry, "greeter")
            .and_then(|cfg| cfg.get_str("greeting").map(str::to_owned))
            .unwrap_or_else(|| DEFAULT_GREETING.to_string());
        Self {
            greeting: greeting.into(),
        }
    }
}

pub async fn greet(
    State(state): State<GreeterState>,
    Query(query): Query<GreeterQuery>,
) -> Json<GreeterResponse> {
    let name = query.name.as_deref().unwrap_or("rk-dev");
    Json(GreeterResponse {
        message: format!("{} {name}!", state.greeting),
    })
}

pub fn routes(registry: &EntryRegistry) -> Router {
    Router::new()
        .route("/v1/greeter", get(greet))
        .with_state(GreeterState::from_registry(registry))
}
