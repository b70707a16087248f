use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;

use crate::entry::PromEntry;

#[derive(Clone)]
struct Tracked {
    prom: Arc<PromEntry>,
    entry: Arc<str>,
}

/// Layer `router` so every request it serves is counted in `prom` under `entry`.
///
/// The path label is the route template, so `/users/{id}` stays one series.
/// Requests no route matched are labelled `unmatched`.
pub fn instrument(router: Router, prom: Arc<PromEntry>, entry: &str) -> Router {
    let state = Tracked {
        prom,
        entry: entry.into(),
    };
    router.layer(middleware::from_fn_with_state(state, track))
}

async fn track(State(state): State<Tracked>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let started = Instant::now();

    let res = next.run(req).await;

    state
        .prom
        .record_http(&state.entry, &method, &path, res.status().as_u16(), started.elapsed());
    res
}
