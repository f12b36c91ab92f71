use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("upstream {service} failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("model error: {0}")]
    Model(String),

    #[error("corrupt chunk record: {0}")]
    CorruptRecord(String),
}

impl Error {
    /// Shorthand for an [`Error::Upstream`] failure.
    pub fn upstream(service: &'static str, message: impl ToString) -> Self {
        Self::Upstream {
            service,
            message: message.to_string(),
        }
    }
}
