use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::JobId;

/// A user-visible message about one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Queued { id: JobId },
    AlreadyQueued { id: JobId },
    Invalid,
    Delivered { id: JobId },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Queued { id } => write!(
                f,
                "📥 Queued YouTube ID: {id}. The download starts once the server is reachable."
            ),
            Notice::AlreadyQueued { id } => write!(f, "ℹ️ YouTube ID {id} is already queued."),
            Notice::Invalid => f.write_str("⚠️ Please send a valid YouTube video link or 11-char ID."),
            Notice::Delivered { id } => write!(f, "✅ Download started for YouTube ID: {id}"),
        }
    }
}

/// Delivers notices back to whoever made the request.
///
/// Best effort: implementations log their own failures and never report them
/// to the queue.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, origin: &str, notice: Notice);
}
