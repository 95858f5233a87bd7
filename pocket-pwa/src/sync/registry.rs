//! Background sync registrations
//!
//! A tag is registered when work is deferred while offline and stays
//! registered until a drain completes without failures. Tags are persisted
//! in the queue's settings so they outlive the process that registered them.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::queue::DurableQueue;

/// Tag used for deferred transaction replay
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

const TAGS_SETTING: &str = "sync_tags";

pub struct SyncRegistry {
    tags: DashMap<String, DateTime<Utc>>,
    wake: Notify,
    store: Option<Arc<DurableQueue>>,
    supported: bool,
}

impl SyncRegistry {
    /// In-memory registry
    pub fn new() -> Self {
        Self {
            tags: DashMap::new(),
            wake: Notify::new(),
            store: None,
            supported: true,
        }
    }

    /// Registry whose tags survive restarts
    pub async fn persistent(store: Arc<DurableQueue>) -> Self {
        let tags = DashMap::new();
        match store
            .get_setting::<BTreeMap<String, DateTime<Utc>>>(TAGS_SETTING)
            .await
        {
            Ok(Some(saved)) => {
                for (tag, at) in saved {
                    tags.insert(tag, at);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not load sync registrations"),
        }
        Self {
            tags,
            wake: Notify::new(),
            store: Some(store),
            supported: true,
        }
    }

    /// Host without a registration facility; reconciliation is then only
    /// opportunistic
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Register a tag. Returns false when the host has no sync facility.
    /// Registering an existing tag keeps its original time.
    pub async fn register(&self, tag: &str) -> bool {
        if !self.supported {
            debug!(tag, "Background sync unavailable");
            return false;
        }
        self.tags.entry(tag.to_string()).or_insert_with(Utc::now);
        self.persist().await;
        true
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    pub fn has_pending(&self) -> bool {
        !self.tags.is_empty()
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }

    /// Drop every registration after a clean drain
    pub async fn complete_all(&self) {
        if self.tags.is_empty() {
            return;
        }
        self.tags.clear();
        self.persist().await;
    }

    /// Explicit wake for the reconciliation task
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub async fn woken(&self) {
        self.wake.notified().await
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot: BTreeMap<String, DateTime<Utc>> = self
            .tags
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        if let Err(e) = store.put_setting(TAGS_SETTING, &snapshot).await {
            warn!(error = %e, "Could not persist sync registrations");
        }
    }
}

impl Default for SyncRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = SyncRegistry::new();
        assert!(registry.register(BACKGROUND_SYNC_TAG).await);
        assert!(registry.register(BACKGROUND_SYNC_TAG).await);
        assert_eq!(registry.tags(), vec![BACKGROUND_SYNC_TAG.to_string()]);

        registry.complete_all().await;
        assert!(!registry.has_pending());
    }

    #[tokio::test]
    async fn test_unsupported_host_registers_nothing() {
        let registry = SyncRegistry::unsupported();
        assert!(!registry.register(BACKGROUND_SYNC_TAG).await);
        assert!(!registry.has_pending());
    }

    #[tokio::test]
    async fn test_tags_persist_in_queue_settings() {
        let queue = Arc::new(DurableQueue::temporary());
        let registry = SyncRegistry::persistent(Arc::clone(&queue)).await;
        registry.register(BACKGROUND_SYNC_TAG).await;

        let reloaded = SyncRegistry::persistent(queue).await;
        assert!(reloaded.is_registered(BACKGROUND_SYNC_TAG));
    }

    #[tokio::test]
    async fn test_wake_before_wait_is_not_lost() {
        let registry = SyncRegistry::new();
        registry.wake();
        tokio::time::timeout(std::time::Duration::from_millis(100), registry.woken())
            .await
            .unwrap();
    }
}
