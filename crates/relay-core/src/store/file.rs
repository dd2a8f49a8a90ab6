//! JSON-lines queue log on local disk.
//!
//! Appends go to the end of the file and are synced before returning.
//! Rewrites build a sibling `*.tmp` snapshot, sync it and rename it over the
//! log, so a crash leaves either the old or the new contents. All operations
//! take the store mutex; this process is the single writer.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::{Job, QueueError, QueueStore};

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) the log at `path`, creating parent directories.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Job>, QueueError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => parse_log(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn append_line(&self, job: &Job) -> Result<(), QueueError> {
        if self.has_torn_tail().await? {
            tracing::warn!(path = %self.path.display(), "dropping torn trailing record before append");
            let jobs = self.load().await?;
            self.write_snapshot(&jobs).await?;
        }

        let mut line = serde_json::to_string(job)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// True when the log does not end in a newline, i.e. the last append was cut short.
    async fn has_torn_tail(&self) -> Result<bool, QueueError> {
        let mut file = match fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if file.metadata().await?.len() == 0 {
            return Ok(false);
        }
        file.seek(SeekFrom::End(-1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        Ok(last[0] != b'\n')
    }

    async fn write_snapshot(&self, jobs: &[Job]) -> Result<(), QueueError> {
        let mut buf = Vec::new();
        for job in jobs {
            serde_json::to_writer(&mut buf, job)?;
            buf.push(b'\n');
        }

        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&buf).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        self.sync_parent().await
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    #[cfg(unix)]
    async fn sync_parent(&self) -> Result<(), QueueError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::File::open(parent).await?.sync_all().await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn sync_parent(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

fn parse_log(raw: &str) -> Result<Vec<Job>, QueueError> {
    let torn_tail = !raw.is_empty() && !raw.ends_with('\n');
    let lines: Vec<&str> = raw.lines().collect();
    let mut jobs = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Job>(line) {
            Ok(job) => jobs.push(job),
            Err(e) if torn_tail && idx + 1 == lines.len() => {
                tracing::warn!(line = idx + 1, error = %e, "ignoring torn trailing record");
            }
            Err(e) => {
                return Err(QueueError::Corrupt {
                    line: idx + 1,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(jobs)
}

#[async_trait]
impl QueueStore for FileStore {
    async fn append(&self, job: &Job) -> Result<(), QueueError> {
        let _guard = self.lock.lock().await;
        self.append_line(job).await
    }

    async fn read_all(&self) -> Result<Vec<Job>, QueueError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn rewrite(&self, jobs: &[Job]) -> Result<(), QueueError> {
        let _guard = self.lock.lock().await;
        self.write_snapshot(jobs).await
    }

    async fn insert_if_absent(&self, job: &Job) -> Result<bool, QueueError> {
        let _guard = self.lock.lock().await;
        let existing = self.load().await?;
        if existing
            .iter()
            .any(|j| j.id == job.id && j.status.is_active())
        {
            return Ok(false);
        }
        self.append_line(job).await?;
        Ok(true)
    }

    async fn swap(&self, expected: &Job, updated: &Job) -> Result<bool, QueueError> {
        let _guard = self.lock.lock().await;
        let mut jobs = self.load().await?;
        let Some(pos) = jobs.iter().rposition(|j| {
            j.id == expected.id && j.status == expected.status && j.attempts == expected.attempts
        }) else {
            return Ok(false);
        };
        jobs[pos] = updated.clone();
        self.write_snapshot(&jobs).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::JobStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    async fn store_in(dir: &tempfile::TempDir) -> FileStore {
        FileStore::open(dir.path().join("queue.jsonl")).await.unwrap()
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir).await;
        assert!(store.read_all().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn append_keeps_insertion_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir).await;
        let now = fixed_now();
        for id in ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"] {
            store.append(&Job::new(id, "1", now)).await?;
        }
        let ids: Vec<_> = store.read_all().await?.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"]);
        Ok(())
    }

    #[tokio::test]
    async fn rewrite_of_read_all_is_byte_identical() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir).await;
        let now = fixed_now();
        let mut failing = Job::new("zzz00000000", "7", now);
        failing.record_failure("HTTP 503: unavailable", now, now);
        store.append(&Job::new("abc12345678", "42", now)).await?;
        store.append(&failing).await?;

        let before = std::fs::read(store.path())?;
        let jobs = store.read_all().await?;
        store.rewrite(&jobs).await?;
        let after = std::fs::read(store.path())?;

        assert_eq!(before, after);
        assert!(!store.tmp_path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn insert_if_absent_blocks_active_ids_only() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir).await;
        let now = fixed_now();

        assert!(store.insert_if_absent(&Job::new("abc12345678", "1", now)).await?);
        assert!(!store.insert_if_absent(&Job::new("abc12345678", "2", now)).await?);

        let mut jobs = store.read_all().await?;
        jobs[0].mark_failed(now);
        store.rewrite(&jobs).await?;

        assert!(store.insert_if_absent(&Job::new("abc12345678", "3", now)).await?);
        let jobs = store.read_all().await?;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].status, JobStatus::Pending);
        assert_eq!(jobs[1].origin, "3");
        Ok(())
    }

    #[tokio::test]
    async fn swap_rejects_stale_expectation() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir).await;
        let now = fixed_now();
        let original = Job::new("abc12345678", "1", now);
        store.append(&original).await?;

        let mut first = original.clone();
        first.record_failure("timeout", now, now);
        assert!(store.swap(&original, &first).await?);

        let mut stale = original.clone();
        stale.record_success(now);
        assert!(!store.swap(&original, &stale).await?);

        let jobs = store.read_all().await?;
        assert_eq!(jobs, vec![first]);
        Ok(())
    }

    #[tokio::test]
    async fn torn_tail_is_ignored_then_healed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir).await;
        let now = fixed_now();
        store.append(&Job::new("abc12345678", "1", now)).await?;

        let mut raw = std::fs::read_to_string(store.path())?;
        raw.push_str(r#"{"id":"half"#);
        std::fs::write(store.path(), raw)?;

        assert_eq!(store.read_all().await?.len(), 1);

        store.append(&Job::new("def12345678", "2", now)).await?;
        let ids: Vec<_> = store.read_all().await?.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, ["abc12345678", "def12345678"]);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_interior_line_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir).await;
        std::fs::write(store.path(), "not json\n")?;

        let err = store.read_all().await.unwrap_err();
        assert!(matches!(err, QueueError::Corrupt { line: 1, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_inserts_survive_swaps() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(store_in(&dir).await);
        let now = fixed_now();
        let seed = Job::new("seed0000000", "0", now);
        store.append(&seed).await?;

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut current = seed;
                for _ in 0..20 {
                    let mut next = current.clone();
                    next.record_failure("HTTP 503", now, now);
                    assert!(store.swap(&current, &next).await.unwrap());
                    current = next;
                }
            })
        };

        let mut inserts = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            inserts.push(tokio::spawn(async move {
                let job = Job::new(format!("job{i:08}"), "1", now);
                store.insert_if_absent(&job).await.unwrap()
            }));
        }

        writer.await?;
        for insert in inserts {
            assert!(insert.await?);
        }

        let jobs = store.read_all().await?;
        assert_eq!(jobs.len(), 21);
        assert_eq!(jobs[0].attempts, 20);
        Ok(())
    }
}
