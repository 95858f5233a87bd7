//! HTTP front for the worker
//!
//! hyper http1 with TokioIo; every request that is not a worker control
//! route is handed to [`ServiceWorker::handle`].

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::lifecycle::WorkerMessage;
use super::upstream::{FetchRequest, FetchResponse};
use super::{ResponseSource, ServiceWorker};
use crate::error::PwaError;

/// Control routes live under this prefix and never reach the origin
pub const CONTROL_PREFIX: &str = "/__worker/";

/// Accept connections until `shutdown` fires
pub async fn run(
    listen: SocketAddr,
    worker: Arc<ServiceWorker>,
    mut shutdown: mpsc::Receiver<()>,
) -> Result<(), PwaError> {
    let listener = TcpListener::bind(listen).await?;
    info!("Worker listening on {}", listen);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let worker = Arc::clone(&worker);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let worker = Arc::clone(&worker);
                            async move { handle_request(worker, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .preserve_header_case(true)
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => error!("Error accepting connection: {:?}", e),
            },
            _ = shutdown.recv() => {
                info!("Worker server shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_request(
    worker: Arc<ServiceWorker>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, method, path);

    if path.starts_with(CONTROL_PREFIX) {
        return Ok(match (method, path.as_str()) {
            (Method::OPTIONS, _) => preflight_response(),
            (Method::POST, "/__worker/message") => {
                let body = req.into_body().collect().await?.to_bytes();
                handle_message(&worker, &body).await
            }
            (Method::GET, "/__worker/status") => status_response(&worker),
            _ => not_found_response(&path),
        });
    }

    let request = match into_fetch_request(&worker, req).await? {
        Ok(request) => request,
        Err(message) => return Ok(error_response(StatusCode::BAD_REQUEST, &message)),
    };

    Ok(match worker.handle(request).await {
        Ok(served) => {
            let mut response = into_response(served.response);
            response
                .headers_mut()
                .insert("x-pocket-source", source_header(served.source));
            response
        }
        Err(e) => error_response(StatusCode::BAD_GATEWAY, &e.to_string()),
    })
}

async fn into_fetch_request(
    worker: &ServiceWorker,
    req: Request<Incoming>,
) -> Result<Result<FetchRequest, String>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = match worker.resolve(path_and_query) {
        Ok(url) => url,
        Err(e) => return Ok(Err(e.to_string())),
    };

    let navigate = is_navigation(&parts.method, &parts.headers);
    Ok(Ok(FetchRequest {
        method: parts.method,
        url,
        headers: parts.headers,
        body,
        navigate,
    }))
}

/// `Sec-Fetch-Mode: navigate`, or an HTML GET from a client that does not
/// send fetch metadata
fn is_navigation(method: &Method, headers: &hyper::HeaderMap) -> bool {
    if let Some(mode) = headers.get("sec-fetch-mode") {
        return mode == "navigate";
    }
    method == Method::GET
        && headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false)
}

async fn handle_message(worker: &ServiceWorker, body: &[u8]) -> Response<Full<Bytes>> {
    match serde_json::from_slice::<WorkerMessage>(body) {
        Ok(message) => {
            let state = worker.handle_message(message).await;
            json_response(StatusCode::OK, serde_json::json!({ "state": state }))
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &format!("Unknown message: {}", e)),
    }
}

fn status_response(worker: &ServiceWorker) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "state": worker.state(),
            "controlling": worker.is_controlling(),
            "caches": worker.caches().names(),
        }),
    )
}

fn source_header(source: ResponseSource) -> HeaderValue {
    HeaderValue::from_static(match source {
        ResponseSource::Network => "network",
        ResponseSource::Cache => "cache",
        ResponseSource::Synthetic => "synthetic",
        ResponseSource::OfflinePage => "offline-page",
        ResponseSource::Queued => "queued",
    })
}

fn into_response(fetched: FetchResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(fetched.body));
    *response.status_mut() = fetched.status;
    *response.headers_mut() = fetched.headers;
    response
}

fn json_response(status: StatusCode, value: serde_json::Value) -> Response<Full<Bytes>> {
    into_response(FetchResponse::json(status, &value))
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        serde_json::json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
        }),
    )
}

fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert("access-control-allow-headers", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        serde_json::json!({ "error": "Not Found", "path": path }),
    )
}
