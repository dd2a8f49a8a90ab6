use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content identifier forwarded downstream; also the dedup key.
pub type JobId = String;

/// Longest diagnostic kept in `last_error`, in characters.
pub const MAX_ERROR_LEN: usize = 400;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

impl JobStatus {
    /// `pending` and `done` jobs block a new enqueue for the same id.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Done)
    }
}

/// One line of the queue log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    /// Opaque requester handle, only used for notifications.
    pub origin: String,
    pub status: JobStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Not retried before this instant. `None` (or epoch 0) means due now.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<JobId>, origin: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            origin: origin.into(),
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.next_attempt_at.is_none_or(|at| now >= at)
    }

    /// Record a delivered attempt. The job is terminal afterwards.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.status = JobStatus::Done;
        self.last_error = None;
        self.next_attempt_at = None;
        self.updated_at = now;
    }

    /// Record a failed attempt and schedule the next one.
    pub fn record_failure(
        &mut self,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(truncate_error(error));
        self.next_attempt_at = Some(next_attempt_at);
        self.updated_at = now;
    }

    /// Give up on the job after a failed attempt.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.next_attempt_at = None;
        self.updated_at = now;
    }
}

fn truncate_error(error: &str) -> String {
    match error.char_indices().nth(MAX_ERROR_LEN) {
        Some((cut, _)) => error[..cut].to_string(),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn new_job_is_pending_and_due() {
        let job = Job::new("abc12345678", "42", at(0));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.is_due(at(0)));
    }

    #[test]
    fn failure_defers_and_success_clears_error() {
        let mut job = Job::new("abc12345678", "42", at(0));
        job.record_failure("HTTP 503", at(5), at(0));
        assert_eq!(job.attempts, 1);
        assert!(!job.is_due(at(4)));
        assert!(job.is_due(at(5)));

        job.record_success(at(6));
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error, None);
        assert!(!job.is_due(at(6) + Duration::days(1)));
    }

    #[test]
    fn long_errors_are_truncated_on_char_boundaries() {
        let mut job = Job::new("abc12345678", "42", at(0));
        let body = "é".repeat(MAX_ERROR_LEN + 50);
        job.record_failure(&body, at(5), at(0));
        assert_eq!(job.last_error.unwrap().chars().count(), MAX_ERROR_LEN);
    }

    #[test]
    fn zero_next_attempt_at_reads_as_due() {
        let line = r#"{"id":"abc12345678","origin":"42","status":"pending","attempts":0,"next_attempt_at":0,"created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}"#;
        let job: Job = serde_json::from_str(line).unwrap();
        assert!(job.is_due(at(0)));
    }
}
