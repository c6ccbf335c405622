// Transaction bookkeeping shared between the lock manager and the
// transaction manager

use std::collections::HashSet;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::common::types::{Rid, TxnId};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Why a transaction was aborted by the lock manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockOnShrinking,
    LockSharedOnReadUncommitted,
    UpgradeConflict,
    Deadlock,
}

/// Typed abort raised on a locking policy violation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Transaction {txn_id} aborted: {reason:?}")]
pub struct TransactionAbortError {
    pub txn_id: TxnId,
    pub reason: AbortReason,
}

/// An active database transaction.
///
/// State and the held-lock sets use interior mutability: the wound-wait
/// check flips another transaction's state to `Aborted` through a shared
/// reference while that transaction sleeps on a lock queue.
pub struct Transaction {
    id: TxnId,
    state: RwLock<TransactionState>,
    isolation_level: IsolationLevel,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            state: RwLock::new(TransactionState::Growing),
            isolation_level,
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.write() = state;
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn is_shared_locked(&self, rid: &Rid) -> bool {
        self.shared_lock_set.lock().contains(rid)
    }

    pub fn is_exclusive_locked(&self, rid: &Rid) -> bool {
        self.exclusive_lock_set.lock().contains(rid)
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub fn remove_shared_lock(&self, rid: &Rid) {
        self.shared_lock_set.lock().remove(rid);
    }

    pub fn remove_exclusive_lock(&self, rid: &Rid) {
        self.exclusive_lock_set.lock().remove(rid);
    }

    /// Every rid this transaction holds a lock on, in either mode
    pub fn held_locks(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }
}
