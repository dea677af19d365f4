//! Router assembly.

pub mod ws;

use axum::Router;
use axum::routing::get;

use crate::hub::Hub;

/// Build the relay router: `/socket` for sessions, `/healthz` for probes.
pub fn app(hub: Hub) -> Router {
    Router::new()
        .route("/socket", get(ws::handle_ws))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(hub)
}
