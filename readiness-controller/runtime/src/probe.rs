use crate::core::{SharedTracker, Tracker};
use anyhow::Result;
use futures::future;
use hyper::{body::Incoming, header, http, server::conn::http1, Request, Response};
use hyper_util::rt::TokioIo;
use std::{convert::Infallible, net::SocketAddr};
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};

type Body = http_body_util::Full<bytes::Bytes>;

/// Serves `/readyz` until shutdown, reporting whether the tracker is
/// satisfied.
#[instrument(skip_all, fields(%addr))]
pub async fn serve(addr: SocketAddr, tracker: SharedTracker, drain: drain::Watch) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Readiness server listening");

    tokio::pin! {
        let shutdown = drain.signaled();
    }
    loop {
        let (stream, client) = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            },
            _ = &mut shutdown => {
                debug!("Readiness server shutting down");
                return Ok(());
            }
        };

        let tracker = tracker.clone();
        tokio::spawn(async move {
            let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                future::ok::<_, Infallible>(handle_ready(&tracker, &req))
            });
            if let Err(error) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), svc)
                .await
            {
                debug!(%error, %client, "Connection failed");
            }
        });
    }
}

fn handle_ready<B>(tracker: &Tracker, req: &Request<B>) -> Response<Body> {
    if req.uri().path() != "/readyz" {
        return Response::builder()
            .status(http::StatusCode::NOT_FOUND)
            .body(Body::default())
            .expect("not found response must be valid");
    }

    match *req.method() {
        http::Method::GET | http::Method::HEAD => {
            if tracker.satisfied() {
                Response::builder()
                    .status(http::StatusCode::OK)
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body("ready\n".into())
                    .expect("ready response must be valid")
            } else {
                Response::builder()
                    .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body("not ready\n".into())
                    .expect("not ready response must be valid")
            }
        }
        _ => Response::builder()
            .status(http::StatusCode::METHOD_NOT_ALLOWED)
            .body(Body::default())
            .expect("method not allowed response must be valid"),
    }
}
