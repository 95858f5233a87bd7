//! Request classification

use hyper::Method;
use regex::Regex;
use std::sync::LazyLock;

/// The one POST path the worker intercepts
pub const TRANSACTION_PATH: &str = "/api/user/transaction";

static STATIC_ASSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(js|css|png|jpg|jpeg|gif|svg|ico|woff|woff2|ttf|eot|webp)$")
        .expect("static pattern compiles")
});

/// How a request is served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Scripts, styles, fonts, images: cache-first
    StaticAsset,
    /// `/api/` and `/auth/`: network-first
    Api,
    /// Pages and everything else: stale-while-revalidate
    Page,
    /// POST to the transaction endpoint: queued when offline
    TransactionPost,
    /// Any other non-GET: passed through untouched
    Passthrough,
}

impl RequestClass {
    /// Classify by method and path (query string excluded)
    pub fn classify(method: &Method, path: &str) -> Self {
        if method == Method::POST && path == TRANSACTION_PATH {
            return RequestClass::TransactionPost;
        }
        if method != Method::GET {
            return RequestClass::Passthrough;
        }
        if STATIC_ASSET.is_match(path) {
            RequestClass::StaticAsset
        } else if path.contains("/api/") || path.contains("/auth/") {
            RequestClass::Api
        } else {
            RequestClass::Page
        }
    }
}
