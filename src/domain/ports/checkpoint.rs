use crate::domain::{errors::DomainError, Thread, ThreadId};
use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

/// Exclusive access to one thread's history for the duration of a turn.
pub type ThreadGuard = OwnedMutexGuard<Thread>;

/// Per-thread history persistence.
///
/// `checkout` serializes turns on the same thread id: a second caller waits
/// until the first guard is dropped. A new id yields an empty thread.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn checkout(&self, thread_id: &ThreadId) -> Result<ThreadGuard, DomainError>;

    async fn snapshot(&self, thread_id: &ThreadId) -> Result<Option<Thread>, DomainError>;
}
