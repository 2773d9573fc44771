// SPDX-License-Identifier: Apache-2.0

//! HTTP transport for the pipeline metrics.
//!
//! A single `GET /metrics` route rendering the registry in the Prometheus
//! text format. The pipeline core does not depend on this module; the binary
//! wires it up next to the pipeline.

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Errors raised by the metrics endpoint.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Binding or serving the listen address failed.
    #[error("metrics endpoint error on {address}: {error}")]
    Io {
        /// The configured listen address.
        address: SocketAddr,
        /// The underlying I/O error.
        error: std::io::Error,
    },
}

async fn metrics_handler() -> Result<String, StatusCode> {
    crate::render_text().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serves `GET /metrics` on `address` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns [`Error::Io`] when the address cannot be bound or the server
/// fails while running.
pub async fn serve(address: SocketAddr, shutdown: CancellationToken) -> Result<(), Error> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| Error::Io { address, error })?;
    info!(%address, "metrics endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|error| Error::Io { address, error })
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;

    #[tokio::test]
    async fn handler_renders_registry() {
        crate::inc_records_processed("t_server_stage", crate::KIND_SOURCE, 1);
        let body = metrics_handler().await.expect("render");
        assert!(body.contains("loggraph_records_processed"));
    }

    #[tokio::test]
    async fn serve_shuts_down_on_cancel() {
        let shutdown = CancellationToken::new();
        let address: SocketAddr = "127.0.0.1:0".parse().expect("address");
        let token = shutdown.clone();
        let server = tokio::spawn(serve(address, token));

        shutdown.cancel();
        server
            .await
            .expect("server task")
            .expect("clean shutdown");
    }
}
