//! Health and metrics endpoints
//!
//! Both listeners share one accept loop. What a path answers depends on the
//! [`Endpoints`] the listener was started with.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::metrics::ProvisionerMetrics;

/// Routes served by one listener.
#[derive(Clone)]
pub enum Endpoints {
    /// `/healthz`, `/livez`, `/readyz`
    Health,

    /// `/metrics` in the Prometheus text format
    Metrics(ProvisionerMetrics),
}

impl Endpoints {
    fn name(&self) -> &'static str {
        match self {
            Endpoints::Health => "health",
            Endpoints::Metrics(_) => "metrics",
        }
    }

    /// Answer a request for `path`.
    pub fn respond(&self, path: &str) -> Response<Full<Bytes>> {
        match (self, path) {
            (Endpoints::Health, "/healthz" | "/livez" | "/readyz") => {
                plain(StatusCode::OK, Bytes::from_static(b"ok"))
            }
            (Endpoints::Metrics(metrics), "/metrics") => match metrics.encode() {
                Ok((buffer, content_type)) => {
                    let mut response = plain(StatusCode::OK, Bytes::from(buffer));
                    if let Ok(value) = HeaderValue::from_str(&content_type) {
                        response.headers_mut().insert(CONTENT_TYPE, value);
                    }
                    response
                }
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    plain(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Bytes::from_static(b"encoding failed"),
                    )
                }
            },
            _ => plain(StatusCode::NOT_FOUND, Bytes::from_static(b"not found")),
        }
    }
}

impl std::fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn plain(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
}

/// Serve `endpoints` on `addr` until the listener fails.
pub async fn serve(addr: SocketAddr, endpoints: Endpoints) -> Result<()> {
    let name = endpoints.name();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("cannot bind {} server to {}: {}", name, addr, e)))?;

    info!(server = name, %addr, "Listening");

    let endpoints = Arc::new(endpoints);
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("{} server accept failed: {}", name, e)))?;

        let endpoints = endpoints.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let response = endpoints.respond(req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(server = name, %peer, "Connection ended with error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Outcome;
    use http_body_util::BodyExt;

    async fn body(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_routes() {
        for path in ["/healthz", "/livez", "/readyz"] {
            let response = Endpoints::Health.respond(path);
            assert_eq!(response.status(), StatusCode::OK, "{}", path);
            assert_eq!(body(response).await, "ok");
        }
        assert_eq!(Endpoints::Health.respond("/metrics").status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let metrics = ProvisionerMetrics::new().unwrap();
        metrics.record_provision::<()>(&Ok(Outcome::Completed(())));
        let endpoints = Endpoints::Metrics(metrics);

        let response = endpoints.respond("/metrics");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CONTENT_TYPE));
        assert!(body(response).await.contains("hostpath_provisioner_provision_total"));

        assert_eq!(endpoints.respond("/healthz").status(), StatusCode::NOT_FOUND);
    }
}
