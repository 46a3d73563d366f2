//! HTTP API
//!
//! Thin glue between axum and the core: handlers parse path/body input,
//! call the workflow or model layer, and serialize the result. No auth.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use peerctl_common::config::Config;

use crate::email::EmailTransport;
use crate::refs::Resolver;
use crate::tasks::TaskRegistry;
use crate::workflow::{AutopeerWorkflow, EmailWorkflow, SessionWorkflow};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub resolver: Arc<Resolver>,
    pub transport: Arc<dyn EmailTransport>,
    pub config: Arc<Config>,
    pub tasks: Arc<TaskRegistry>,
}

impl AppState {
    fn session_workflow(&self) -> SessionWorkflow {
        SessionWorkflow::new(
            self.db.clone(),
            Arc::clone(&self.resolver),
            self.config.limits.free_max_sessions,
        )
    }

    pub fn email_workflow(&self) -> EmailWorkflow {
        EmailWorkflow::new(
            self.session_workflow(),
            Arc::clone(&self.transport),
            self.config.email.clone(),
        )
    }

    pub fn autopeer_workflow(&self) -> AutopeerWorkflow {
        AutopeerWorkflow::new(
            self.session_workflow(),
            self.config.autopeer.clone(),
            std::time::Duration::from_secs(self.config.bridges.timeout_secs),
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/net/:asn/sessions", get(handlers::list_sessions))
        .route(
            "/api/net/:asn/session/:session_id/meta",
            put(handlers::set_session_meta),
        )
        .route("/api/net/:asn/requests", get(handlers::list_requests))
        .route("/api/net/:asn/exchanges", get(handlers::list_exchanges))
        .route(
            "/api/net/:asn/port/:port/peers",
            get(handlers::available_peers),
        )
        .route(
            "/api/net/:asn/peer/:peer_asn",
            get(handlers::peer_detail).put(handlers::update_peer),
        )
        .route(
            "/api/net/:asn/peer/:peer_asn/request",
            post(handlers::request_peering),
        )
        .route(
            "/api/net/:asn/peer/:peer_asn/autopeer",
            post(handlers::autopeer),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
