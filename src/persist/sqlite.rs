//! SQLite journal for the catalog.
//!
//! `events` holds one row per [`StoredOp`], tagged with the book and loan it
//! touches so per-record history can be read without replaying. `snapshots`
//! holds full catalog images; replay starts from the newest one.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    core::catalog::{Catalog, CatalogConfig, CatalogSnapshotV1},
    op::{OP_FORMAT_VERSION, StoredOp, StoredOpEnvelope},
    types::{BookId, LoanId, OpSeq},
};

use super::{OpSink, PersistError, PersistResult};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    snapshot: CatalogSnapshotV1,
}

/// Catalog journal stored in one SQLite database.
pub struct SqliteOpSink {
    conn: Connection,
}

impl SqliteOpSink {
    /// Opens or creates a journal at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Journal that lives only as long as the value.
    pub fn open_in_memory() -> PersistResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Rebuilds a catalog from the newest snapshot plus every event after it.
    ///
    /// An event that no longer applies (a loan for a missing book, a return
    /// with no open loan) aborts the load with [`PersistError::Replay`].
    pub fn load_catalog(&self, config: CatalogConfig) -> PersistResult<Catalog> {
        let mut catalog = match self.latest_snapshot()? {
            Some(snapshot) => Catalog::from_snapshot(snapshot, config)?,
            None => Catalog::with_config(config),
        };

        let from = catalog.latest_op_seq();
        let events = self.load_events_after(from)?;
        let replayed = events.len();
        for event in events {
            catalog.apply_replayed_op(event)?;
        }
        debug!(
            from,
            replayed,
            books = catalog.export_snapshot().books.len(),
            "catalog rebuilt from journal"
        );
        Ok(catalog)
    }

    /// Events strictly after `seq`, oldest first.
    pub fn load_events_after(&self, seq: OpSeq) -> PersistResult<Vec<StoredOp>> {
        self.select_ops(
            "SELECT payload FROM events WHERE seq > ?1 ORDER BY seq",
            &seq_param(seq),
        )
    }

    /// Journaled ops that registered, loaned or returned `book_id`.
    ///
    /// Compacted events are gone; history only reaches back to the last
    /// compaction.
    pub fn book_history(&self, book_id: BookId) -> PersistResult<Vec<StoredOp>> {
        self.select_ops(
            "SELECT payload FROM events WHERE book_id = ?1 ORDER BY seq",
            &seq_param(book_id),
        )
    }

    /// Journaled ops for one loan: opened, returned, deleted.
    pub fn loan_history(&self, loan_id: LoanId) -> PersistResult<Vec<StoredOp>> {
        self.select_ops(
            "SELECT payload FROM events WHERE loan_id = ?1 ORDER BY seq",
            &seq_param(loan_id),
        )
    }

    /// Stores `snapshot` as covering every event up to `last_seq`.
    pub fn write_snapshot(&mut self, snapshot: &CatalogSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        let payload = serde_json::to_vec(&SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        })?;
        self.conn.execute(
            "INSERT INTO snapshots(last_seq, ts_ms, books, loans, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                seq_param(last_seq),
                Utc::now().timestamp_millis(),
                snapshot.books.len(),
                snapshot.loans.len(),
                payload,
            ],
        )?;
        debug!(
            last_seq,
            books = snapshot.books.len(),
            loans = snapshot.loans.len(),
            "snapshot written"
        );
        Ok(())
    }

    /// Deletes events up to and including `seq`.
    pub fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM events WHERE seq <= ?1", params![seq_param(seq)])?)
    }

    /// Highest journaled sequence, or 0 when the events table is empty.
    pub fn latest_seq(&self) -> PersistResult<OpSeq> {
        let seq: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(seq), 0) FROM events", [], |row| row.get(0))?;
        Ok(OpSeq::try_from(seq).unwrap_or(0))
    }

    fn latest_snapshot(&self) -> PersistResult<Option<CatalogSnapshotV1>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|payload| -> PersistResult<CatalogSnapshotV1> {
                let env: SnapshotEnvelope = serde_json::from_slice(&payload)?;
                check_format("snapshot", env.format_version, SNAPSHOT_FORMAT_VERSION)?;
                Ok(env.snapshot)
            })
            .transpose()
    }

    fn select_ops(&self, sql: &str, key: &dyn ToSql) -> PersistResult<Vec<StoredOp>> {
        let mut stmt = self.conn.prepare(sql)?;
        let payloads = stmt
            .query_map([key], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|payload| -> PersistResult<StoredOp> {
                let env: StoredOpEnvelope = serde_json::from_slice(payload)?;
                check_format("op", env.format_version, OP_FORMAT_VERSION)?;
                Ok(env.stored)
            })
            .collect()
    }
}

impl OpSink for SqliteOpSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        let Some(last) = ops.last() else {
            return self.latest_seq();
        };

        // one transaction per batch: a failed batch leaves no rows behind
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO events(seq, ts_ms, kind, book_id, loan_id, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for stored in ops {
                let payload = serde_json::to_vec(&StoredOpEnvelope::new(stored.clone()))?;
                insert.execute(params![
                    seq_param(stored.seq),
                    seq_param(stored.ts_ms),
                    stored.op.kind_code(),
                    stored.op.book_id().map(seq_param),
                    stored.op.loan_id().map(seq_param),
                    payload,
                ])?;
            }
        }
        tx.commit()?;

        Ok(last.seq)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &CatalogSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        SqliteOpSink::write_snapshot(self, snapshot, last_seq)
    }

    fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        SqliteOpSink::compact_through(self, seq)
    }
}

/// SQLite integers are signed; ids and sequences never get near the limit.
fn seq_param(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn check_format(what: &str, found: u16, expected: u16) -> PersistResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(PersistError::Message(format!(
            "unsupported {what} format version: {found}"
        )))
    }
}
