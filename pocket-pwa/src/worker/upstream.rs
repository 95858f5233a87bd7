//! Live fetches to the app origin

use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Method, StatusCode};
use std::time::Duration;

use crate::error::NetworkError;

/// Headers that describe one hop and must not be forwarded
static HOP_HEADERS: [header::HeaderName; 5] = [
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::HOST,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// Absolute URL on the origin
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Top-level page navigation
    pub navigate: bool,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            navigate: false,
        }
    }

    pub fn navigation(url: impl Into<String>) -> Self {
        Self {
            navigate: true,
            ..Self::get(url)
        }
    }

    pub fn post_json(url: impl Into<String>, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            method: Method::POST,
            url: url.into(),
            headers,
            body,
            navigate: false,
        }
    }

    /// Path component of the URL, without query
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.url.split('?').next().unwrap_or("/").to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: StatusCode, content_type: &'static str, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status, "application/json", Bytes::from(value.to_string()))
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Where live responses come from
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Err only when no response arrived at all; HTTP error statuses are Ok
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError>;
}

/// Fetches over HTTP with reqwest
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        let mut headers = request.headers.clone();
        strip_hop_headers(&mut headers);

        let response = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_headers(&mut headers);
        let body = response.bytes().await?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

pub(crate) fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in HOP_HEADERS.iter() {
        headers.remove(name);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scriptable origin: a body per URL and an online switch
    #[derive(Default)]
    pub(crate) struct FakeOrigin {
        pub offline: AtomicBool,
        pub bodies: Mutex<std::collections::HashMap<String, (StatusCode, String)>>,
        pub hits: AtomicUsize,
        pub posts: Mutex<Vec<Bytes>>,
    }

    impl FakeOrigin {
        pub fn serve(&self, url: &str, body: &str) {
            self.bodies
                .lock()
                .unwrap()
                .insert(url.to_string(), (StatusCode::OK, body.to_string()));
        }

        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Upstream for FakeOrigin {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(NetworkError::Connection("offline".into()));
            }
            if request.method == Method::POST {
                self.posts.lock().unwrap().push(request.body.clone());
                return Ok(FetchResponse::json(
                    StatusCode::OK,
                    &serde_json::json!({"message": "Transaction added"}),
                ));
            }
            let bodies = self.bodies.lock().unwrap();
            match bodies.get(&request.url) {
                Some((status, body)) => Ok(FetchResponse::new(
                    *status,
                    "text/plain",
                    Bytes::from(body.clone()),
                )),
                None => Ok(FetchResponse::new(
                    StatusCode::NOT_FOUND,
                    "text/plain",
                    Bytes::from_static(b"missing"),
                )),
            }
        }
    }

    #[test]
    fn test_request_path_excludes_query() {
        let req = FetchRequest::get("http://localhost:3000/api/user/pockets?x=1");
        assert_eq!(req.path(), "/api/user/pockets");
    }

    #[test]
    fn test_hop_headers_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        strip_hop_headers(&mut headers);
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::ACCEPT).is_some());
    }
}
