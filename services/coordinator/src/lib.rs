//! External event surface and process wiring binding the broadcast
//! engine, fluidics engine, and status actor into one axum server, the
//! way `services/server` binds its forwarder/receiver WS routes to one
//! `AppState`.

pub mod config_paths;
pub mod events;
pub mod startup;
pub mod state;
pub mod ws;

pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

mod health {
    use axum::response::IntoResponse;
    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/dpu-evolver", get(ws::dpu_evolver_handler))
        .route("/ws/robotics", get(ws::robotics_handler))
        .route("/healthz", get(health::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
