//! Durable retry-delivery queue: job model, persisted log, dedup enqueue and
//! retry backoff. Delivery and scheduling live in `relay-worker`.

mod backoff;
mod enqueue;
mod error;
mod extract;
mod job;
mod notify;
pub mod store;

pub use backoff::BackoffPolicy;
pub use enqueue::{EnqueueOutcome, EnqueueService};
pub use error::QueueError;
pub use extract::extract_video_id;
pub use job::{Job, JobId, JobStatus, MAX_ERROR_LEN};
pub use notify::{Notice, Notifier};
pub use store::QueueStore;
pub use store::file::FileStore;
