//! Worker lifecycle: install, wait, activate
//!
//! Install pre-caches the shell. A freshly installed worker waits until
//! `skip_waiting` (directly or via the `SKIP_WAITING` message); activation
//! drops every cache namespace from other versions and takes control of all
//! pages without a reload.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::upstream::FetchRequest;
use super::ServiceWorker;
use crate::error::NetworkError;

/// Page served in place of a failed navigation
pub const OFFLINE_PAGE: &str = "/offline.html";

/// App shell cached at install
pub const SHELL_ASSETS: &[&str] = &[
    "/",
    OFFLINE_PAGE,
    "/manifest.json",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting to take over
    Installed,
    Activating,
    Activated,
    /// Install failed; this worker will never control pages
    Redundant,
}

/// Messages a page can post to the worker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl ServiceWorker {
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Pages are routed through the strategies only once activated
    pub fn is_controlling(&self) -> bool {
        self.state() == WorkerState::Activated
    }

    /// Pre-cache the shell into the static namespace. Any missing asset
    /// fails the install and leaves the worker redundant.
    pub async fn install(&self) -> Result<(), NetworkError> {
        self.state.send_replace(WorkerState::Installing);

        for asset in SHELL_ASSETS {
            let url = self.resolve(asset)?;
            let outcome = match self.upstream.fetch(&FetchRequest::get(&url)).await {
                Ok(response) if response.is_success() => {
                    self.caches.put(&self.names.static_name, &url, &response);
                    Ok(())
                }
                Ok(response) => Err(NetworkError::InvalidRequest(format!(
                    "shell asset {} returned {}",
                    asset, response.status
                ))),
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                warn!(asset, error = %e, "Install failed");
                self.state.send_replace(WorkerState::Redundant);
                return Err(e);
            }
        }

        self.state.send_replace(WorkerState::Installed);
        info!(
            cache = %self.names.static_name,
            assets = SHELL_ASSETS.len(),
            "Worker installed"
        );
        Ok(())
    }

    /// Take over now instead of waiting. Only an installed worker can.
    pub async fn skip_waiting(&self) -> bool {
        if self.state() != WorkerState::Installed {
            return false;
        }
        self.activate().await;
        true
    }

    /// Delete foreign cache namespaces and claim every page. Returns the
    /// deleted names. A no-op unless the worker is installed.
    pub async fn activate(&self) -> Vec<String> {
        if self.state() != WorkerState::Installed {
            return Vec::new();
        }
        self.state.send_replace(WorkerState::Activating);

        let stale: Vec<String> = self
            .caches
            .names()
            .into_iter()
            .filter(|name| !self.names.is_current(name))
            .collect();
        for name in &stale {
            self.caches.delete(name);
            info!(cache = %name, "Deleted stale cache");
        }

        self.state.send_replace(WorkerState::Activated);
        info!(version = self.config.version, "Worker activated, controlling all pages");
        stale
    }

    /// Install then take over at once
    pub async fn start(&self) -> Result<(), NetworkError> {
        self.install().await?;
        self.skip_waiting().await;
        Ok(())
    }

    pub async fn handle_message(&self, message: WorkerMessage) -> WorkerState {
        match message {
            WorkerMessage::SkipWaiting => {
                if !self.skip_waiting().await {
                    info!(state = ?self.state(), "SKIP_WAITING ignored");
                }
            }
        }
        self.state()
    }
}

/// Keep trying to install and take over until the shell is reachable
pub fn spawn_install_task(
    worker: Arc<ServiceWorker>,
    retry_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match worker.start().await {
                Ok(()) => break,
                Err(e) => {
                    warn!(error = %e, "Worker install failed, retrying in {:?}", retry_interval);
                    tokio::time::sleep(retry_interval).await;
                }
            }
        }
    })
}
