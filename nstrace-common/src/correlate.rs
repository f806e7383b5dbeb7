//! Entry/exit correlation keyed by calling thread
//!
//! Each operation kind owns one table. An entry hook stores [`Pending`]; the
//! matching exit hook on the same thread takes it back out and resolves it to
//! a [`Completion`]. The entry is always removed before the outcome is
//! inspected, so a failed or discarded operation never leaves state behind.
//!
//! A thread cannot have two outstanding operations of the same kind, so the
//! thread id alone is a sufficient key. Entries orphaned by a thread that never
//! returns stay until the thread id is reused or capacity evicts them.

use crate::kind;
use crate::socket::SocketRef;
use crate::{Pending, Skip};

/// Thread-keyed storage for pending operations.
pub trait CorrelationTable {
    /// Store `pending` for `thread_id`, replacing any stale entry.
    /// Fails with [`Skip::TableFull`] when capacity is exhausted.
    fn insert(&self, thread_id: u32, pending: Pending) -> Result<(), Skip>;

    /// Look up and delete the entry for `thread_id`.
    fn take(&self, thread_id: u32) -> Option<Pending>;
}

/// Two-phase operations observed through an entry/return hook pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// `tcp_v4_connect`: the entry socket is reported, the return code decides.
    Connect,
    /// `inet_csk_accept`: the return value is the new socket, null on failure.
    Accept,
}

/// Outcome of resolving a pending entry at the exit hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Report this socket.
    Completed(SocketRef),
    /// Operation failed, nothing to report.
    Discarded,
}

impl Operation {
    /// Event kind of a completed operation.
    pub const fn kind(self) -> u16 {
        match self {
            Operation::Connect => kind::EGRESS,
            Operation::Accept => kind::INGRESS,
        }
    }

    /// Resolve `pending` against the raw return value of the exit hook.
    #[inline(always)]
    pub fn complete(self, pending: Pending, ret: i64) -> Completion {
        match self {
            Operation::Connect if ret == 0 => Completion::Completed(SocketRef(pending.socket)),
            Operation::Connect => Completion::Discarded,
            Operation::Accept => match SocketRef(ret as u64) {
                accepted if accepted.is_null() => Completion::Discarded,
                accepted => Completion::Completed(accepted),
            },
        }
    }
}

/// One operation kind bound to its table.
pub struct Correlator<'a, C> {
    table: &'a C,
    operation: Operation,
}

impl<'a, C: CorrelationTable> Correlator<'a, C> {
    pub fn new(table: &'a C, operation: Operation) -> Self {
        Self { table, operation }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Record the socket seen by the entry hook.
    #[inline(always)]
    pub fn begin(&self, thread_id: u32, socket: SocketRef) -> Result<(), Skip> {
        self.table.insert(thread_id, Pending { socket: socket.0 })
    }

    /// Remove the thread's entry and resolve it.
    ///
    /// Returns [`Skip::Uncorrelated`] when no entry hook ran for this thread,
    /// or [`Skip::OperationFailed`] when the operation did not complete.
    #[inline(always)]
    pub fn finish(&self, thread_id: u32, ret: i64) -> Result<SocketRef, Skip> {
        let pending = self.table.take(thread_id).ok_or(Skip::Uncorrelated)?;
        match self.operation.complete(pending, ret) {
            Completion::Completed(socket) => Ok(socket),
            Completion::Discarded => Err(Skip::OperationFailed),
        }
    }
}
