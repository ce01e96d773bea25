use thiserror::Error;

/// Failures the store gateway can report. The lifecycle manager reacts to the
/// variant kind, everything else bubbles up as context.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed store record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("session {0} is not the open session")]
    UnknownSession(u64),
    #[error("unknown user {0}")]
    UnknownUser(u64),
}

pub type StoreResult<T> = Result<T, StoreError>;
