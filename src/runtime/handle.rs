use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, error, warn};

use crate::{
    book::{Book, BookDraft},
    core::catalog::{Catalog, CatalogSnapshotV1},
    error::{CatalogError, CatalogResult},
    loan::{Loan, LoanDraft},
    op::StoredOp,
    persist::{OpSink, PersistError},
    types::{BookId, LoanId, OpSeq},
};

use super::events::CatalogEvent;

/// Failures surfaced through a [`CatalogHandle`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The catalog rejected the request.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Journaling failed or the persistence queue is full.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The runtime task has stopped.
    #[error("catalog runtime is not running")]
    ChannelClosed,
}

impl RuntimeError {
    /// The catalog rejection behind this error, if that is what it is.
    pub fn as_catalog(&self) -> Option<&CatalogError> {
        match self {
            Self::Catalog(err) => Some(err),
            _ => None,
        }
    }
}

/// Queue sizes and batching for [`spawn_catalog`]. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pending requests before callers wait.
    pub command_queue_bound: usize,
    /// Broadcast buffer per subscriber.
    pub event_capacity: usize,
    /// Buffered ops that trigger an immediate append.
    pub batch_max_ops: usize,
    /// Longest an op waits in the buffer before it is appended.
    pub batch_max_latency_ms: u64,
    /// Op batches in flight to the journal. A mutation is refused when full.
    pub persist_queue_bound: usize,
    /// Zero disables automatic snapshots.
    pub snapshot_every_ops: usize,
    /// Delete journaled ops once a snapshot covers them.
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_capacity: 1024,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
        }
    }
}

/// Cloneable front door to a catalog owned by a background task.
///
/// Commands from every clone are processed one at a time, so each use-case
/// runs as a single critical section over books and loans.
#[derive(Clone)]
pub struct CatalogHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<CatalogEvent>,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    RegisterBook {
        draft: BookDraft,
        resp: Reply<Result<Book, RuntimeError>>,
    },
    ListAvailable {
        resp: Reply<Vec<Book>>,
    },
    SearchByTitle {
        query: String,
        resp: Reply<Vec<Book>>,
    },
    CreateLoan {
        draft: LoanDraft,
        resp: Reply<Result<Loan, RuntimeError>>,
    },
    ReturnBook {
        book_id: BookId,
        resp: Reply<Result<Loan, RuntimeError>>,
    },
    DeleteLoan {
        loan_id: LoanId,
        resp: Reply<Result<(), RuntimeError>>,
    },
    GetBook {
        id: BookId,
        resp: Reply<Option<Book>>,
    },
    GetLoan {
        id: LoanId,
        resp: Reply<Option<Loan>>,
    },
    ListLoans {
        resp: Reply<Vec<Loan>>,
    },
    Flush {
        resp: Reply<Result<OpSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: Reply<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: Reply<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Ops(Vec<StoredOp>),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: CatalogSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
}

struct Loop {
    catalog: Catalog,
    events_tx: broadcast::Sender<CatalogEvent>,
    persist_tx: Option<mpsc::Sender<PersistMsg>>,
    config: RuntimeConfig,
    ops_since_snapshot: usize,
}

/// Moves `catalog` into a background task and returns a handle to it.
///
/// Must be called from within a tokio runtime.
pub fn spawn_catalog(
    catalog: Catalog,
    sink: Option<Box<dyn OpSink>>,
    config: RuntimeConfig,
) -> CatalogHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<CatalogEvent>(config.event_capacity.max(1));

    let (persist_tx, mut durable_rx) = match sink {
        Some(sink) => {
            let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound.max(1));
            let (durable_tx, durable_rx) = mpsc::unbounded_channel::<OpSeq>();
            spawn_persistence_worker(sink, persist_rx, durable_tx, config.clone());
            (Some(persist_tx), Some(durable_rx))
        }
        None => (None, None),
    };

    let mut state = Loop {
        catalog,
        events_tx: events_tx.clone(),
        persist_tx,
        config,
        ops_since_snapshot: 0,
    };

    tokio::spawn(async move {
        let mut durable_open = durable_rx.is_some();
        loop {
            let cmd = tokio::select! {
                cmd = cmd_rx.recv() => cmd,
                durable = recv_durable(&mut durable_rx), if durable_open => {
                    match durable {
                        Some(op_seq) => {
                            let _ = state.events_tx.send(CatalogEvent::DurableUpTo { op_seq });
                        }
                        None => durable_open = false,
                    }
                    continue;
                }
            };

            let Some(cmd) = cmd else {
                break;
            };
            if state.handle(cmd).await {
                break;
            }
        }
        debug!("catalog runtime stopped");
    });

    CatalogHandle { cmd_tx, events_tx }
}

impl CatalogHandle {
    /// Live event stream. Slow subscribers may observe lag.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events_tx.subscribe()
    }

    /// See [`Catalog::register_book`].
    pub async fn register_book(&self, draft: BookDraft) -> Result<Book, RuntimeError> {
        self.request(|resp| Command::RegisterBook { draft, resp }).await?
    }

    #[allow(missing_docs)]
    pub async fn list_available(&self) -> Result<Vec<Book>, RuntimeError> {
        self.request(|resp| Command::ListAvailable { resp }).await
    }

    #[allow(missing_docs)]
    pub async fn search_by_title(&self, query: impl Into<String>) -> Result<Vec<Book>, RuntimeError> {
        let query = query.into();
        self.request(|resp| Command::SearchByTitle { query, resp }).await
    }

    /// See [`Catalog::create_loan`].
    pub async fn create_loan(&self, draft: LoanDraft) -> Result<Loan, RuntimeError> {
        self.request(|resp| Command::CreateLoan { draft, resp }).await?
    }

    /// Returns the closed loan.
    pub async fn return_book(&self, book_id: BookId) -> Result<Loan, RuntimeError> {
        self.request(|resp| Command::ReturnBook { book_id, resp }).await?
    }

    /// See [`Catalog::delete_loan`].
    pub async fn delete_loan(&self, loan_id: LoanId) -> Result<(), RuntimeError> {
        self.request(|resp| Command::DeleteLoan { loan_id, resp }).await?
    }

    #[allow(missing_docs)]
    pub async fn get_book(&self, id: BookId) -> Result<Option<Book>, RuntimeError> {
        self.request(|resp| Command::GetBook { id, resp }).await
    }

    #[allow(missing_docs)]
    pub async fn get_loan(&self, id: LoanId) -> Result<Option<Loan>, RuntimeError> {
        self.request(|resp| Command::GetLoan { id, resp }).await
    }

    #[allow(missing_docs)]
    pub async fn list_loans(&self) -> Result<Vec<Loan>, RuntimeError> {
        self.request(|resp| Command::ListLoans { resp }).await
    }

    /// Waits until every op accepted so far is durable and returns its seq.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await?
    }

    /// Flushes, then writes a snapshot of the current state.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Checkpoint { resp }).await?
    }

    /// Flushes outstanding ops and stops the runtime.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await?
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

impl Loop {
    /// Returns true once the loop should stop.
    async fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::RegisterBook { draft, resp } => {
                let res = self.apply("register_book", |catalog| {
                    let (book, _) = catalog.register_book(draft)?;
                    let event = CatalogEvent::BookRegistered { id: book.id };
                    Ok((book, event))
                });
                self.after_mutation(res.is_ok()).await;
                let _ = resp.send(res);
            }
            Command::ListAvailable { resp } => {
                let _ = resp.send(self.catalog.list_available());
            }
            Command::SearchByTitle { query, resp } => {
                let _ = resp.send(self.catalog.search_by_title(&query));
            }
            Command::CreateLoan { draft, resp } => {
                let res = self.apply("create_loan", |catalog| {
                    let (loan, _) = catalog.create_loan(draft)?;
                    let event = CatalogEvent::BookLoaned {
                        book_id: loan.book_id,
                        loan_id: loan.id,
                    };
                    Ok((loan, event))
                });
                self.after_mutation(res.is_ok()).await;
                let _ = resp.send(res);
            }
            Command::ReturnBook { book_id, resp } => {
                let res = self.apply("return_book", |catalog| {
                    let (loan, _) = catalog.return_book(book_id)?;
                    let event = CatalogEvent::BookReturned {
                        book_id,
                        loan_id: loan.id,
                    };
                    Ok((loan, event))
                });
                self.after_mutation(res.is_ok()).await;
                let _ = resp.send(res);
            }
            Command::DeleteLoan { loan_id, resp } => {
                let res = self.apply("delete_loan", |catalog| {
                    catalog.delete_loan(loan_id)?;
                    Ok(((), CatalogEvent::LoanDeleted { loan_id }))
                });
                self.after_mutation(res.is_ok()).await;
                let _ = resp.send(res);
            }
            Command::GetBook { id, resp } => {
                let _ = resp.send(self.catalog.get_book(id).cloned());
            }
            Command::GetLoan { id, resp } => {
                let _ = resp.send(self.catalog.get_loan(id).cloned());
            }
            Command::ListLoans { resp } => {
                let _ = resp.send(self.catalog.list_loans());
            }
            Command::Flush { resp } => {
                let out = match &self.persist_tx {
                    Some(tx) => {
                        let (flush_tx, flush_rx) = oneshot::channel();
                        round_trip(tx, PersistMsg::Flush { resp: flush_tx }, flush_rx).await
                    }
                    None => Ok(self.catalog.latest_op_seq()),
                };
                let _ = resp.send(out);
            }
            Command::Checkpoint { resp } => {
                let out = self.checkpoint().await;
                let _ = resp.send(out);
            }
            Command::Shutdown { resp } => {
                let out = match &self.persist_tx {
                    Some(tx) => {
                        let (done_tx, done_rx) = oneshot::channel();
                        round_trip(tx, PersistMsg::Shutdown { resp: done_tx }, done_rx).await
                    }
                    None => Ok(()),
                };
                let _ = resp.send(out);
                return true;
            }
        }

        false
    }

    /// Runs one mutating use-case with journal capacity reserved up front.
    ///
    /// A full persistence queue rejects the request before the catalog is
    /// touched, so a failed request never leaves unjournaled state behind.
    fn apply<T>(
        &mut self,
        operation: &'static str,
        run: impl FnOnce(&mut Catalog) -> CatalogResult<(T, CatalogEvent)>,
    ) -> Result<T, RuntimeError> {
        let permit = self.reserve_journal_slot()?;
        let (value, event) = run(&mut self.catalog).map_err(|err| rejected(operation, err))?;

        let ops = self.catalog.drain_pending_ops();
        match permit {
            Some(permit) => {
                permit.send(PersistMsg::Ops(ops));
            }
            None => {
                let _ = self.events_tx.send(CatalogEvent::DurableUpTo {
                    op_seq: self.catalog.latest_op_seq(),
                });
            }
        }
        let _ = self.events_tx.send(event);
        Ok(value)
    }

    fn reserve_journal_slot(&self) -> Result<Option<mpsc::OwnedPermit<PersistMsg>>, RuntimeError> {
        let Some(tx) = &self.persist_tx else {
            return Ok(None);
        };
        tx.clone().try_reserve_owned().map(Some).map_err(|err| {
            error!(error = %err, "persist queue full, request refused");
            RuntimeError::Persist(PersistError::Message(format!("persist queue error: {err}")))
        })
    }

    async fn after_mutation(&mut self, applied: bool) {
        if !applied {
            return;
        }
        self.ops_since_snapshot += 1;
        if self.config.snapshot_every_ops == 0 || self.ops_since_snapshot < self.config.snapshot_every_ops {
            return;
        }
        if let Err(err) = self.checkpoint().await {
            error!(error = %err, "automatic checkpoint failed");
        }
    }

    async fn checkpoint(&mut self) -> Result<(), RuntimeError> {
        let Some(tx) = &self.persist_tx else {
            return Ok(());
        };
        let (cp_tx, cp_rx) = oneshot::channel();
        let msg = PersistMsg::Checkpoint {
            snapshot: self.catalog.export_snapshot(),
            last_seq: self.catalog.latest_op_seq(),
            compact: self.config.compact_after_snapshot,
            resp: cp_tx,
        };
        round_trip(tx, msg, cp_rx).await?;
        self.ops_since_snapshot = 0;
        Ok(())
    }
}

async fn recv_durable(rx: &mut Option<mpsc::UnboundedReceiver<OpSeq>>) -> Option<OpSeq> {
    match rx {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

fn rejected(operation: &'static str, err: CatalogError) -> RuntimeError {
    warn!(operation, kind = err.kind(), error = %err, "catalog operation rejected");
    RuntimeError::Catalog(err)
}

async fn round_trip<T>(
    tx: &mpsc::Sender<PersistMsg>,
    msg: PersistMsg,
    rx: oneshot::Receiver<Result<T, PersistError>>,
) -> Result<T, RuntimeError> {
    tx.send(msg).await.map_err(|_| RuntimeError::ChannelClosed)?;
    rx.await
        .map_err(|_| RuntimeError::ChannelClosed)?
        .map_err(RuntimeError::from)
}

type SharedSink = Arc<Mutex<Box<dyn OpSink>>>;

fn spawn_persistence_worker(
    sink: Box<dyn OpSink>,
    mut rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<OpSeq>,
    config: RuntimeConfig,
) {
    let sink: SharedSink = Arc::new(Mutex::new(sink));
    let latency = Duration::from_millis(config.batch_max_latency_ms);

    tokio::spawn(async move {
        let mut buf = Vec::<StoredOp>::new();
        let mut deadline = Instant::now() + latency;
        let mut last_durable: OpSeq = 0;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        if flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx).await.is_err() {
                            error!(lost = buf.len(), "runtime dropped with unjournaled ops");
                        }
                        break;
                    };

                    match msg {
                        PersistMsg::Ops(ops) => {
                            buf.extend(ops);
                            if buf.len() >= config.batch_max_ops {
                                // a failed batch stays buffered and is retried
                                let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx).await;
                                deadline = Instant::now() + latency;
                            }
                        }
                        PersistMsg::Flush { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx).await;
                            let _ = resp.send(result.map(|()| last_durable));
                            deadline = Instant::now() + latency;
                        }
                        PersistMsg::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let result = match flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx).await {
                                Ok(()) => write_checkpoint(&sink, snapshot, last_seq, compact).await,
                                Err(err) => Err(err),
                            };
                            let _ = resp.send(result);
                            deadline = Instant::now() + latency;
                        }
                        PersistMsg::Shutdown { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx).await;
                            let _ = resp.send(result);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !buf.is_empty() => {
                    let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx).await;
                    deadline = Instant::now() + latency;
                }
            }
        }
    });
}

/// Appends the buffered ops. On failure they go back into `buf` ahead of
/// anything queued later, so the next attempt retries them in seq order and
/// `last_durable` never moves past a gap.
async fn flush_buf(
    sink: &SharedSink,
    buf: &mut Vec<StoredOp>,
    last_durable: &mut OpSeq,
    durable_tx: &mpsc::UnboundedSender<OpSeq>,
) -> Result<(), PersistError> {
    let ops = std::mem::take(buf);
    let sink_ref = Arc::clone(sink);
    let (unwritten, appended, flushed) = tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        let appended = if ops.is_empty() {
            None
        } else {
            match sink.append_ops(&ops) {
                Ok(seq) => Some(seq),
                Err(err) => return (ops, None, Err(err)),
            }
        };
        (Vec::new(), appended, sink.flush())
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?;

    if !unwritten.is_empty() {
        let queued = std::mem::replace(buf, unwritten);
        buf.extend(queued);
    }
    if let Some(seq) = appended {
        *last_durable = (*last_durable).max(seq);
        let _ = durable_tx.send(*last_durable);
    }
    flushed.map_err(|err| {
        error!(error = %err, pending = buf.len(), "journal append failed");
        err
    })
}

async fn write_checkpoint(
    sink: &SharedSink,
    snapshot: CatalogSnapshotV1,
    last_seq: OpSeq,
    compact: bool,
) -> Result<(), PersistError> {
    let sink_ref = Arc::clone(sink);
    tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        sink.write_snapshot(&snapshot, last_seq)?;
        if compact {
            let removed = sink.compact_through(last_seq)?;
            debug!(removed, last_seq, "journal compacted");
        }
        Ok::<(), PersistError>(())
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?
}
