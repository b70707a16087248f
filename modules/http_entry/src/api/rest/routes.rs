use axum::routing::get;
use axum::Router;

use crate::api::rest::handlers::{self, CommonState};

/// Common service routes under `prefix`; an empty prefix mounts them at the root.
pub fn common_routes(prefix: &str, state: CommonState) -> Router {
    let prefix = normalize_prefix(prefix);
    let path = |p: &str| format!("{prefix}/{p}");

    Router::new()
        .route(&path("ping"), get(handlers::ping))
        .route(&path("healthy"), get(handlers::healthy))
        .route(&path("info"), get(handlers::app_info))
        .route(&path("entries"), get(handlers::entries))
        .route(
            &path("shutdown"),
            get(handlers::shutdown).post(handlers::shutdown),
        )
        .with_state(state)
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_normalization() {
        assert_eq!(normalize_prefix("/rk/v1"), "/rk/v1");
        assert_eq!(normalize_prefix("rk/v1/"), "/rk/v1");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
    }
}
