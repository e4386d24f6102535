/// SQLite-backed journal sink.
pub mod sqlite;

use thiserror::Error;

use crate::{
    core::catalog::CatalogSnapshotV1,
    error::CatalogError,
    op::StoredOp,
    types::OpSeq,
};

/// Failures while writing or replaying the journal.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The database refused a statement.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A payload could not be encoded or decoded.
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
    /// A stored op does not apply to the state rebuilt before it.
    #[error("replay rejected: {0}")]
    Replay(#[from] CatalogError),
    /// Anything else, including queue and version errors.
    #[error("{0}")]
    Message(String),
}

/// Result alias for persistence calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Durable destination for catalog journal ops.
pub trait OpSink: Send {
    /// Appends `ops` atomically and returns the last stored sequence.
    ///
    /// On error nothing from `ops` may be kept, so the caller can retry the
    /// same batch.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;
    /// Forces appended ops to stable storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
    /// Stores a snapshot covering every op up to `last_seq`.
    fn write_snapshot(&mut self, _snapshot: &CatalogSnapshotV1, _last_seq: OpSeq) -> PersistResult<()> {
        Ok(())
    }
    /// Drops ops already covered by a snapshot. Returns how many went.
    fn compact_through(&mut self, _seq: OpSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
