//! HTTP server implementation
//!
//! hyper http1 with TokioIo; requests are routed on `(method, path)`.

use bytes::Bytes;
use bson::oid::ObjectId;
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
use tracing::{debug, error, info, warn};

use crate::db::schemas::TransactionDoc;
use crate::error::LedgerError;
use crate::store::UserStore;

/// Shared application state
pub struct AppState {
    pub user_id: ObjectId,
    pub cors_origin: HeaderValue,
    pub store: Arc<dyn UserStore>,
}

impl AppState {
    pub fn new(
        user_id: ObjectId,
        cors_origin: &str,
        store: Arc<dyn UserStore>,
    ) -> Result<Self, LedgerError> {
        let cors_origin = HeaderValue::from_str(cors_origin)
            .map_err(|e| LedgerError::BadRequest(format!("Invalid CORS origin: {}", e)))?;
        Ok(Self {
            user_id,
            cors_origin,
            store,
        })
    }
}

pub async fn run(listen: SocketAddr, state: Arc<AppState>) -> Result<(), LedgerError> {
    let listener = TcpListener::bind(listen).await?;
    info!("Ledger listening on {} ({} store)", listen, state.store.backend());
    serve(listener, state).await
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), LedgerError> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
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
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, method, path);

    let body = if method == Method::POST {
        req.into_body().collect().await?.to_bytes()
    } else {
        Bytes::new()
    };

    Ok(route(&state, method, &path, body).await)
}

/// Dispatch one request. Every response carries the CORS origin.
pub async fn route(
    state: &AppState,
    method: Method,
    path: &str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = match (method, path) {
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/api") | (Method::GET, "/api/") => json_response(
            StatusCode::OK,
            serde_json::json!({ "message": "API is working!" }),
        ),

        (Method::GET, "/health") => json_response(
            StatusCode::OK,
            serde_json::json!({ "status": "ok", "store": state.store.backend() }),
        ),

        (Method::POST, "/api/user/transaction") => {
            add_transaction(state, &body).await.unwrap_or_else(|e| error_response(&e))
        }

        (Method::GET, "/api/user/transactions") => {
            list_transactions(state).await.unwrap_or_else(|e| error_response(&e))
        }

        (Method::GET, "/api/user/pockets") => {
            list_pockets(state).await.unwrap_or_else(|e| error_response(&e))
        }

        _ => not_found_response(path),
    };

    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, state.cors_origin.clone());
    response
}

// =============================================================================
// Handlers
// =============================================================================

async fn add_transaction(
    state: &AppState,
    body: &[u8],
) -> Result<Response<Full<Bytes>>, LedgerError> {
    let tx: TransactionDoc = serde_json::from_slice(body)
        .map_err(|e| LedgerError::BadRequest(format!("Invalid transaction body: {}", e)))?;

    let receipt = state.store.add_transaction(&state.user_id, tx).await?;
    info!(
        pocket = %receipt.pocket.name,
        amount = receipt.transaction.amount,
        kind = %receipt.transaction.tx_type,
        balance = receipt.pocket.balance,
        "Transaction added"
    );

    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({ "message": "Transaction added", "user": receipt }),
    ))
}

async fn list_transactions(state: &AppState) -> Result<Response<Full<Bytes>>, LedgerError> {
    let user = state
        .store
        .find_user(&state.user_id)
        .await?
        .ok_or(LedgerError::UserNotFound)?;
    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({ "transactions": user.transactions }),
    ))
}

async fn list_pockets(state: &AppState) -> Result<Response<Full<Bytes>>, LedgerError> {
    let user = state
        .store
        .find_user(&state.user_id)
        .await?
        .ok_or(LedgerError::UserNotFound)?;
    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({ "name": user.name, "pockets": user.pockets }),
    ))
}

// =============================================================================
// Responses
// =============================================================================

fn json_response(status: StatusCode, value: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(value.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn error_response(err: &LedgerError) -> Response<Full<Bytes>> {
    let status = err.status();
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        warn!(error = %err, "Request rejected");
    }
    json_response(status, serde_json::json!({ "error": err.public_message() }))
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;

    #[tokio::test]
    async fn test_every_response_carries_cors_origin() {
        let id = ObjectId::new();
        let store = Arc::new(MemoryUserStore::seeded(id, "Asha"));
        let state = AppState::new(id, "https://pocket.example", store).unwrap();

        for (method, path) in [
            (Method::GET, "/api"),
            (Method::OPTIONS, "/api/user/transaction"),
            (Method::GET, "/nope"),
        ] {
            let response = route(&state, method, path, Bytes::new()).await;
            assert_eq!(
                response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
                "https://pocket.example"
            );
        }
    }
}
