//! HTTP listener lifecycle.
//!
//! Business routes are mounted by the caller; this module owns only the health
//! endpoints and the bounded graceful shutdown of the listener.

use std::io;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::errors::ConsumerError;
use crate::lifecycle::{Shutdown, drain};

/// `/healthz` always answers 200 while the process is up; `/readyz` turns 503
/// once shutdown has started so load balancers stop sending traffic.
pub fn health_routes(shutdown: Shutdown) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .with_state(shutdown)
}

/// Wraps `routes` with request tracing and a per-request timeout.
pub fn app(routes: Router, request_timeout: Duration) -> Router {
    routes
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness(State(shutdown): State<Shutdown>) -> (StatusCode, &'static str) {
    if shutdown.is_triggered() {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    } else {
        (StatusCode::OK, "ready")
    }
}

/// Serves `router` until `shutdown` fires, then stops accepting connections
/// and waits at most `grace` for in-flight requests.
///
/// Returns [`crate::errors::ShutdownError::Timeout`] (wrapped) when requests
/// were still running after `grace`; the server task is aborted in that case.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: Shutdown,
    grace: Duration,
) -> Result<(), ConsumerError> {
    let local_addr = listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(address = %local_addr, "http listener started");

    let stop = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop.wait().await })
            .await
    });

    tokio::select! {
        joined = &mut server => return flatten(joined),
        _ = shutdown.wait() => {}
    }

    info!(
        address = %local_addr,
        grace_ms = grace.as_millis() as u64,
        "http listener closed, waiting for in-flight requests"
    );
    match drain("http server", &mut server, grace).await {
        Ok(joined) => {
            flatten(joined)?;
            info!(address = %local_addr, "http server stopped");
            Ok(())
        }
        Err(err) => {
            warn!(address = %local_addr, error = %err, "forcing http server to stop");
            server.abort();
            Err(err.into())
        }
    }
}

fn flatten(joined: Result<io::Result<()>, JoinError>) -> Result<(), ConsumerError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(ConsumerError::Server(err.to_string())),
        Err(err) => Err(ConsumerError::Server(format!("server task failed: {err}"))),
    }
}
