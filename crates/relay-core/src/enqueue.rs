use std::sync::Arc;

use chrono::Utc;

use crate::{Job, JobId, Notice, Notifier, QueueError, QueueStore, extract_video_id};

/// What happened to one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued(Job),
    AlreadyQueued(JobId),
    Invalid,
}

impl EnqueueOutcome {
    pub fn notice(&self) -> Notice {
        match self {
            EnqueueOutcome::Queued(job) => Notice::Queued { id: job.id.clone() },
            EnqueueOutcome::AlreadyQueued(id) => Notice::AlreadyQueued { id: id.clone() },
            EnqueueOutcome::Invalid => Notice::Invalid,
        }
    }
}

#[derive(Clone)]
pub struct EnqueueService {
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn Notifier>,
}

impl EnqueueService {
    pub fn new(store: Arc<dyn QueueStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Queue `id` unless it is already pending or done.
    pub async fn enqueue(&self, id: &str, origin: &str) -> Result<EnqueueOutcome, QueueError> {
        let job = Job::new(id, origin, Utc::now());
        if self.store.insert_if_absent(&job).await? {
            tracing::info!(job_id = %job.id, origin, "job queued");
            Ok(EnqueueOutcome::Queued(job))
        } else {
            tracing::info!(job_id = %id, origin, "job already queued");
            Ok(EnqueueOutcome::AlreadyQueued(id.to_string()))
        }
    }

    /// Handle raw requester text: extract an id, enqueue it and tell the
    /// requester what happened.
    pub async fn submit(&self, text: &str, origin: &str) -> Result<EnqueueOutcome, QueueError> {
        let outcome = match extract_video_id(text) {
            Some(id) => self.enqueue(&id, origin).await?,
            None => {
                tracing::warn!(origin, "could not parse a video id from message");
                EnqueueOutcome::Invalid
            }
        };
        self.notifier.notify(origin, outcome.notice()).await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{FileStore, JobStatus};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, Notice)>>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, origin: &str, notice: Notice) {
            self.0.lock().unwrap().push((origin.to_string(), notice));
        }
    }

    async fn service(dir: &tempfile::TempDir) -> (EnqueueService, Arc<FileStore>, Arc<Recorder>) {
        let store = Arc::new(FileStore::open(dir.path().join("q.jsonl")).await.unwrap());
        let notes = Arc::new(Recorder::default());
        (EnqueueService::new(store.clone(), notes.clone()), store, notes)
    }

    #[tokio::test]
    async fn first_enqueue_creates_pending_record() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (svc, store, _) = service(&dir).await;

        let outcome = svc.enqueue("abc12345678", "42").await?;
        assert!(matches!(outcome, EnqueueOutcome::Queued(_)));

        let jobs = store.read_all().await?;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "abc12345678");
        assert_eq!(jobs[0].origin, "42");
        assert_eq!(jobs[0].status, JobStatus::Pending);
        assert_eq!(jobs[0].attempts, 0);
        assert_eq!(jobs[0].next_attempt_at, None);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_is_absorbed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (svc, store, notes) = service(&dir).await;

        svc.submit("https://youtu.be/abc12345678", "42").await?;
        let second = svc.submit("abc12345678", "43").await?;

        assert_eq!(second, EnqueueOutcome::AlreadyQueued("abc12345678".into()));
        assert_eq!(store.read_all().await?.len(), 1);
        let notes = notes.0.lock().unwrap();
        assert_eq!(
            notes[1],
            ("43".to_string(), Notice::AlreadyQueued { id: "abc12345678".into() })
        );
        Ok(())
    }

    #[tokio::test]
    async fn done_jobs_still_block() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (svc, store, _) = service(&dir).await;

        svc.enqueue("abc12345678", "42").await?;
        let mut jobs = store.read_all().await?;
        jobs[0].record_success(Utc::now());
        store.rewrite(&jobs).await?;

        let outcome = svc.enqueue("abc12345678", "42").await?;
        assert!(matches!(outcome, EnqueueOutcome::AlreadyQueued(_)));
        assert_eq!(store.read_all().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unparseable_text_never_touches_the_store() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (svc, store, notes) = service(&dir).await;

        let outcome = svc.submit("hello", "42").await?;
        assert_eq!(outcome, EnqueueOutcome::Invalid);
        assert!(store.read_all().await?.is_empty());
        assert_eq!(notes.0.lock().unwrap()[0].1, Notice::Invalid);
        Ok(())
    }
}
