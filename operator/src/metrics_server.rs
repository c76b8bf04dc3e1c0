//! Minimal `/metrics` and `/healthz` HTTP endpoint, built directly on
//! `hyper`/`hyper-util` rather than a full web framework — the teacher's
//! own `storage-operator` pulls in exactly these three crates
//! (`hyper`, `hyper-util`, `http-body-util`) and nothing heavier for its
//! metrics surface, so this follows the same minimal-server shape instead
//! of reaching for `axum` as the bigger platform crates in the pack do.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::rt::TokioExecutor;
use owo_colors::OwoColorize;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use session_operator_common::colors::FG2;

/// Serves `/metrics` (Prometheus text exposition format) and `/healthz`
/// until `shutdown` is cancelled. A bind failure is logged and the future
/// simply returns, since a dead metrics endpoint shouldn't take down the
/// reconciler or cullers it shares a process with.
pub async fn run(registry: Registry, port: u16, shutdown: CancellationToken) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind metrics server");
            return;
        }
    };
    tracing::info!("{}", format!("metrics server listening on {addr}").color(FG2));

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, _peer) = match accepted {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "metrics server failed to accept connection");
                continue;
            }
        };
        let registry = registry.clone();
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, registry.clone()));
            if let Err(err) = ConnBuilder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                tracing::debug!(error = %err, "metrics connection closed with error");
            }
        });
    }
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    registry: Registry,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/healthz" => Response::new(Full::new(Bytes::from_static(b"ok"))),
        "/metrics" => {
            let metric_families = registry.gather();
            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            if encoder.encode(&metric_families, &mut buffer).is_err() {
                return Ok(not_found());
            }
            Response::new(Full::new(Bytes::from(buffer)))
        }
        _ => return Ok(not_found()),
    };
    Ok(response)
}

fn not_found() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(Bytes::from_static(b"not found")))
        .expect("static not-found response")
}
