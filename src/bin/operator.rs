use std::{future::IntoFuture as _, sync::Arc};

use anyhow::Context as _;
use clap::Parser as _;
use sns_operator::{
    config::Config,
    operator::{self, State},
    sns::AwsConnector,
    telemetry,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    telemetry::init(config.log_format).await?;

    // Provider access, credentials come from the default AWS chain
    let connector =
        AwsConnector::from_env(config.endpoint_url.clone(), config.request_timeout()).await;

    // Initialize Kubernetes controller state
    let state = State::default();
    let controller = operator::SnsController::new(state.clone());

    // Start web server
    let listener = TcpListener::bind(config.listen).await?;
    let router = handlers::router();
    let server = axum::serve(listener, router.with_state(state));

    // Run both the http server and the controllers; the controllers stop on a signal
    tokio::select! {
        c = controller.run(Arc::new(connector), config.poll_interval()) => c,
        s = server.into_future() => s.context("server exited early"),
    }
}

/// Handlers for the web server portion of the operator
mod handlers {
    use axum::{extract::State, http::StatusCode, response::IntoResponse, routing, Json, Router};
    use prometheus::{Encoder, TextEncoder};

    use sns_operator::operator::State as OperatorState;

    /// Construct the router for all the handlers
    pub fn router() -> Router<OperatorState> {
        Router::new()
            .route("/metrics", routing::get(metrics))
            .route("/health", routing::get(health))
            .route("/", routing::get(index))
    }

    /// Handler for exposing prometheus metrics
    async fn metrics(State(state): State<OperatorState>) -> impl IntoResponse {
        let metrics = state.metrics();
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        match encoder.encode(&metrics, &mut buffer) {
            Ok(()) => (StatusCode::OK, buffer),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string().into_bytes()),
        }
    }

    /// Handler for checking the health of the server
    async fn health() -> impl IntoResponse {
        (StatusCode::OK, Json("healthy"))
    }

    /// Handler for interacting with the operator
    async fn index(State(state): State<OperatorState>) -> impl IntoResponse {
        let diagnostics = state.diagnostics().await;

        (StatusCode::OK, Json(diagnostics))
    }
}
