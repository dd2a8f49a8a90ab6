pub mod file;

use async_trait::async_trait;

use crate::{Job, QueueError};

/// The persisted job log and the only source of queue state.
///
/// Implementations serialize every operation so that the dedup check in
/// [`QueueStore::insert_if_absent`] and the compare-and-swap in
/// [`QueueStore::swap`] never race a concurrent writer.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append one record. Durable before returning.
    async fn append(&self, job: &Job) -> Result<(), QueueError>;

    /// Every record in insertion order. An empty store is not an error.
    async fn read_all(&self) -> Result<Vec<Job>, QueueError>;

    /// Atomically replace the whole log with `jobs`, in order.
    async fn rewrite(&self, jobs: &[Job]) -> Result<(), QueueError>;

    /// Append `job` unless a `pending` or `done` record with the same id exists.
    /// Returns whether the job was appended.
    async fn insert_if_absent(&self, job: &Job) -> Result<bool, QueueError>;

    /// Replace the active record matching `expected` (same id, status and
    /// attempts) with `updated`. Returns `false` if no such record exists,
    /// leaving the log untouched.
    async fn swap(&self, expected: &Job, updated: &Job) -> Result<bool, QueueError>;
}
