use std::thread;

use parking_lot::RwLock;

use crate::common::config::TxnId;

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Running,
    Committed,
    Aborted,
}

/// Represents a transaction. The index layer threads this handle through its
/// operations without consulting it; lock bookkeeping lives above.
#[derive(Debug)]
pub struct Transaction {
    txn_id: TxnId,
    thread_id: thread::ThreadId,
    state: RwLock<TransactionState>,
}

impl Transaction {
    pub fn new(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            thread_id: thread::current().id(),
            state: RwLock::new(TransactionState::Running),
        }
    }

    pub fn get_txn_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn get_thread_id(&self) -> thread::ThreadId {
        self.thread_id
    }

    pub fn get_state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.write() = state;
    }
}
