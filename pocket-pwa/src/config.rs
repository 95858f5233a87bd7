//! Configuration for pocket-pwa
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Command;

/// Ledger deployments the app knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ApiEnvironment {
    Development,
    Staging,
    Production,
    /// Ledger on the local network
    Custom,
}

impl ApiEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            ApiEnvironment::Development => "http://localhost:5000",
            ApiEnvironment::Staging => "https://upi-pwa-staging.onrender.com",
            ApiEnvironment::Production => "https://upi-pwa.onrender.com",
            ApiEnvironment::Custom => "http://192.168.1.15:5000",
        }
    }
}

/// Pocket Pay - offline-resilient UPI payments
#[derive(Parser, Debug, Clone)]
#[command(name = "pocket-pwa")]
#[command(about = "Launch UPI payments, keep them durable offline and sync them to the ledger")]
pub struct Args {
    /// Ledger deployment to talk to
    #[arg(long, env = "POCKET_API_ENV", value_enum, default_value = "development")]
    pub api_env: ApiEnvironment,

    /// Explicit ledger base URL (overrides --api-env)
    #[arg(long, env = "POCKET_API_URL")]
    pub api_url: Option<String>,

    /// App origin fronted by the worker daemon
    #[arg(long, env = "POCKET_ORIGIN_URL", default_value = "http://localhost:3000")]
    pub origin_url: String,

    /// Address the worker daemon listens on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:8787")]
    pub listen: SocketAddr,

    /// Directory of the local transaction store
    #[arg(long, env = "POCKET_DATA_DIR", default_value = ".pocket")]
    pub data_dir: PathBuf,

    /// Worker cache version; bumping it drops old caches on activation
    #[arg(long, env = "POCKET_CACHE_VERSION", default_value = "1")]
    pub cache_version: u32,

    /// Seconds between connectivity probes
    #[arg(long, env = "POCKET_PROBE_INTERVAL_SECS", default_value = "15")]
    pub probe_interval_secs: u64,

    /// User agent used for platform detection and upstream requests
    #[arg(long, env = "POCKET_USER_AGENT", default_value = concat!("pocket-pwa/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,

    /// Request timeout in milliseconds
    #[arg(long, env = "POCKET_REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Behave like a host without background sync registration
    #[arg(long, env = "POCKET_NO_BACKGROUND_SYNC", default_value = "false")]
    pub no_background_sync: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Ledger base URL: explicit override first, then the environment table
    pub fn api_base_url(&self) -> Result<url::Url, String> {
        let raw = self
            .api_url
            .as_deref()
            .unwrap_or_else(|| self.api_env.base_url());
        url::Url::parse(raw).map_err(|e| format!("Invalid API URL '{}': {}", raw, e))
    }

    pub fn origin(&self) -> Result<url::Url, String> {
        url::Url::parse(&self.origin_url)
            .map_err(|e| format!("Invalid origin URL '{}': {}", self.origin_url, e))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.api_base_url()?;
        self.origin()?;

        if self.request_timeout_ms == 0 {
            return Err("POCKET_REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.probe_interval_secs == 0 {
            return Err("POCKET_PROBE_INTERVAL_SECS must be greater than zero".to_string());
        }
        if self.cache_version == 0 {
            return Err("POCKET_CACHE_VERSION must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["pocket-pwa"];
        argv.extend_from_slice(extra);
        argv.push("sync");
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_api_url_from_environment_table() {
        let args = parse(&["--api-env", "staging"]);
        assert_eq!(
            args.api_base_url().unwrap().as_str(),
            "https://upi-pwa-staging.onrender.com/"
        );
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_explicit_api_url_wins() {
        let args = parse(&["--api-env", "production", "--api-url", "http://10.0.0.2:5000"]);
        assert_eq!(args.api_base_url().unwrap().as_str(), "http://10.0.0.2:5000/");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(parse(&["--api-url", "not a url"]).validate().is_err());
        assert!(parse(&["--request-timeout-ms", "0"]).validate().is_err());
        assert!(parse(&["--cache-version", "0"]).validate().is_err());
    }
}
