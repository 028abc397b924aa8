use std::path::PathBuf;
use thiserror::Error;

/// Ошибки хранилища снапшотов
#[derive(Error, Debug)]
pub enum StoreError {
    /// Встроенная СУБД не поднялась, продолжать нельзя
    #[error("Failed to load embedded database engine: {0}")]
    EngineLoad(#[source] rusqlite::Error),

    #[error("Snapshot store is not initialized")]
    NotInitialized,

    /// Транзакция записи откатана (попытка отката сделана)
    #[error("Snapshot write failed and was rolled back: {0}")]
    Transaction(#[source] rusqlite::Error),

    #[error("Database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Stored {kind} record '{id}' cannot be decoded: {source}")]
    Decode {
        kind: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to flush database to {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
