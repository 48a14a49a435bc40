//! HTTP API server for the rental booking engine.
//!
//! Exposes the booking lifecycle, availability ledger and notifications over
//! JSON, wires the event channel consumers and the outbox relay, and reports
//! through tracing and Prometheus metrics.

pub mod config;
pub mod consumers;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::{AppState, Backend};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: Backend>(state: Arc<AppState<B>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/ready", get(routes::health::ready::<B>))
        .route(
            "/bookings",
            get(routes::bookings::get::<B>).post(routes::bookings::create::<B>),
        )
        .route("/bookings/renter", get(routes::bookings::list_by_renter::<B>))
        .route("/bookings/owner", get(routes::bookings::list_by_owner::<B>))
        .route("/bookings/confirm", post(routes::bookings::confirm::<B>))
        .route("/bookings/cancel", post(routes::bookings::cancel::<B>))
        .route("/bookings/activate", post(routes::bookings::activate::<B>))
        .route("/bookings/complete", post(routes::bookings::complete::<B>))
        .route("/bookings/update", post(routes::bookings::update::<B>))
        .route("/bookings/payment", post(routes::bookings::record_payment::<B>))
        .route("/availability", get(routes::availability::list::<B>))
        .route("/availability/check", get(routes::availability::check::<B>))
        .route("/availability/block", post(routes::availability::block::<B>))
        .route("/availability/release", post(routes::availability::release::<B>))
        .route(
            "/notifications",
            get(routes::notifications::list::<B>).post(routes::notifications::send::<B>),
        )
        .route("/notifications/unread", get(routes::notifications::unread::<B>))
        .route("/notifications/read", post(routes::notifications::mark_read::<B>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
