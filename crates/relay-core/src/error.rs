use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt store record at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
