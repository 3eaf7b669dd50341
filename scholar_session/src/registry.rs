//! Session registry.
//!
//! Owns the rule that each local conversation id maps to exactly one remote
//! conversation handle. Creation is serialized per key: concurrent callers
//! for the same id wait on a shared lock and find the mapping the first one
//! persisted, while different ids proceed in parallel.

use scholar_core::{ConversationStore, Deadline, Error, KnowledgeService, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

pub struct SessionRegistry {
    store: Arc<dyn ConversationStore>,
    service: Arc<dyn KnowledgeService>,
    /// In-progress creations, keyed by local id
    creating: Mutex<HashMap<String, KeyLock>>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ConversationStore>, service: Arc<dyn KnowledgeService>) -> Self {
        Self {
            store,
            service,
            creating: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure `local_id` has a remote conversation.
    ///
    /// Returns `true` if this call created it. The mapping is persisted only
    /// after the remote conversation exists, so a failed creation leaves no
    /// record behind.
    pub async fn ensure_conversation(&self, local_id: &str, deadline: Deadline) -> Result<bool> {
        if self.resolve(local_id).await?.is_some() {
            return Ok(false);
        }

        let key = self.key_lock(local_id);
        let _held = key.lock.lock().await;
        self.create_if_missing(local_id, deadline).await
    }

    /// Remote handle for `local_id`, if one was registered. Never calls the service.
    pub async fn resolve(&self, local_id: &str) -> Result<Option<String>> {
        self.store.get(local_id).await.map_err(Error::Store)
    }

    pub async fn contains(&self, local_id: &str) -> Result<bool> {
        self.store.contains(local_id).await.map_err(Error::Store)
    }

    async fn create_if_missing(&self, local_id: &str, deadline: Deadline) -> Result<bool> {
        if let Some(remote_id) = self.resolve(local_id).await? {
            debug!(local_id, %remote_id, "Conversation created by a concurrent caller");
            return Ok(false);
        }

        let remote_id = deadline
            .run(
                "create_conversation",
                local_id,
                self.service.create_conversation(),
            )
            .await?
            .map_err(|cause| Error::RemoteCreate {
                local_id: local_id.to_string(),
                cause,
            })?;

        self.store
            .put(local_id, &remote_id)
            .await
            .map_err(Error::Store)?;

        info!(local_id, %remote_id, "Conversation created");
        Ok(true)
    }

    fn key_lock<'a>(&'a self, local_id: &'a str) -> KeyLockHandle<'a> {
        let mut creating = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(creating.entry(local_id.to_string()).or_default());
        KeyLockHandle {
            creating: &self.creating,
            local_id,
            lock,
        }
    }
}

/// A caller's share of a per-key lock.
///
/// The last handle for a key removes the map entry when dropped, including
/// when the owning future is cancelled while waiting.
struct KeyLockHandle<'a> {
    creating: &'a Mutex<HashMap<String, KeyLock>>,
    local_id: &'a str,
    lock: KeyLock,
}

impl Drop for KeyLockHandle<'_> {
    fn drop(&mut self) {
        let mut creating = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference held by the map, one by this handle.
        let last = creating
            .get(self.local_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) <= 2);
        if last {
            creating.remove(self.local_id);
        }
    }
}
