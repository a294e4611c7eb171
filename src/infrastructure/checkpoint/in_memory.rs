use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use crate::domain::{
    ports::{CheckpointStore, ThreadGuard},
    DomainError, Thread, ThreadId,
};

/// Thread histories kept for the life of the process.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    threads: StdMutex<HashMap<ThreadId, Arc<Mutex<Thread>>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, thread_id: &ThreadId, create: bool) -> Result<Option<Arc<Mutex<Thread>>>, DomainError> {
        let mut threads = self
            .threads
            .lock()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        if create {
            let slot = threads
                .entry(thread_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Thread::new(thread_id.clone()))));
            Ok(Some(slot.clone()))
        } else {
            Ok(threads.get(thread_id).cloned())
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn checkout(&self, thread_id: &ThreadId) -> Result<ThreadGuard, DomainError> {
        let slot = self
            .slot(thread_id, true)?
            .ok_or_else(|| DomainError::internal("thread slot was not created"))?;
        Ok(slot.lock_owned().await)
    }

    async fn snapshot(&self, thread_id: &ThreadId) -> Result<Option<Thread>, DomainError> {
        match self.slot(thread_id, false)? {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Message;
    use std::time::Duration;

    #[tokio::test]
    async fn test_new_thread_starts_empty() {
        let store = InMemoryCheckpointStore::new();
        let id = ThreadId::from("fresh");

        assert!(store.snapshot(&id).await.unwrap().is_none());
        assert!(store.checkout(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_persists_between_checkouts() {
        let store = InMemoryCheckpointStore::new();
        let id = ThreadId::from("t1");

        store.checkout(&id).await.unwrap().push(Message::user("hi")).unwrap();

        let thread = store.snapshot(&id).await.unwrap().unwrap();
        assert_eq!(thread.len(), 1);
        assert!(store.snapshot(&ThreadId::from("t2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkout_is_exclusive_per_thread() {
        let store = InMemoryCheckpointStore::new();
        let id = ThreadId::from("busy");

        let guard = store.checkout(&id).await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), store.checkout(&id)).await;
        assert!(waiting.is_err());

        let other = tokio::time::timeout(Duration::from_millis(50), store.checkout(&ThreadId::from("idle"))).await;
        assert!(other.is_ok());

        drop(guard);
        assert!(store.checkout(&id).await.is_ok());
    }
}
