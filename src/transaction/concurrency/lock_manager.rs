use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use log::debug;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::common::types::Rid;
use crate::transaction::concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionAbortError, TransactionState,
};

/// Lock modes a transaction can request on a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// One pending or granted lock request. The request owns an Arc to its
/// transaction so a wound can flip the victim's state in place.
struct LockRequest {
    txn: Arc<Transaction>,
    mode: LockMode,
    granted: bool,
}

/// Per-row request queue in insertion order. Granted requests may sit at
/// any position after upgrades and wound removals.
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
        }
    }
}

type LockTable = HashMap<Rid, LockRequestQueue>;

/// Row-level two-phase lock manager with wound-wait deadlock prevention.
///
/// For two transactions contending on a row, either the older proceeds
/// first or the younger is aborted; no wait-for cycle can form. A wounded
/// waiter discovers its abort on the next wakeup and backs out.
pub struct LockManager {
    lock_table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            lock_table: Mutex::new(HashMap::new()),
        }
    }

    /// Take a shared lock on `rid`. Returns `Ok(false)` when the
    /// transaction is or becomes aborted while waiting.
    pub fn lock_shared(
        &self,
        txn: &Arc<Transaction>,
        rid: Rid,
    ) -> Result<bool, TransactionAbortError> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }

        // Read-uncommitted never takes shared locks
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbortError {
                txn_id: txn.id(),
                reason: AbortReason::LockSharedOnReadUncommitted,
            });
        }

        if txn.state() == TransactionState::Shrinking
            && txn.isolation_level() == IsolationLevel::RepeatableRead
        {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbortError {
                txn_id: txn.id(),
                reason: AbortReason::LockOnShrinking,
            });
        }

        if txn.is_shared_locked(&rid) {
            return Ok(true);
        }

        let mut table = self.lock_table.lock();
        table.entry(rid).or_default().requests.push_back(LockRequest {
            txn: txn.clone(),
            mode: LockMode::Shared,
            granted: false,
        });
        txn.add_shared_lock(rid);

        while Self::need_wait_shared(&table, txn, rid) {
            Self::wait(&mut table, rid);
            if txn.state() == TransactionState::Aborted {
                return Ok(false);
            }
        }

        Self::grant(&mut table, txn, rid);
        txn.set_state(TransactionState::Growing);
        Ok(true)
    }

    /// Take an exclusive lock on `rid`
    pub fn lock_exclusive(
        &self,
        txn: &Arc<Transaction>,
        rid: Rid,
    ) -> Result<bool, TransactionAbortError> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }

        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbortError {
                txn_id: txn.id(),
                reason: AbortReason::LockOnShrinking,
            });
        }

        if txn.is_exclusive_locked(&rid) {
            return Ok(true);
        }

        let mut table = self.lock_table.lock();
        table.entry(rid).or_default().requests.push_back(LockRequest {
            txn: txn.clone(),
            mode: LockMode::Exclusive,
            granted: false,
        });
        txn.add_exclusive_lock(rid);

        while Self::need_wait_exclusive(&table, txn, rid) {
            Self::wait(&mut table, rid);
            if txn.state() == TransactionState::Aborted {
                return Ok(false);
            }
        }

        Self::grant(&mut table, txn, rid);
        txn.set_state(TransactionState::Growing);
        Ok(true)
    }

    /// Upgrade an already-held shared lock to exclusive. The original
    /// request stays where it is in the queue; only the transaction's lock
    /// sets change.
    pub fn lock_upgrade(
        &self,
        txn: &Arc<Transaction>,
        rid: Rid,
    ) -> Result<bool, TransactionAbortError> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }

        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbortError {
                txn_id: txn.id(),
                reason: AbortReason::LockOnShrinking,
            });
        }

        if txn.is_exclusive_locked(&rid) {
            return Ok(true);
        }
        debug_assert!(txn.is_shared_locked(&rid), "upgrade requires a held shared lock");

        let mut table = self.lock_table.lock();
        while Self::need_wait_upgrade(&table, txn, rid) {
            Self::wait(&mut table, rid);
            if txn.state() == TransactionState::Aborted {
                return Ok(false);
            }
        }

        txn.remove_shared_lock(&rid);
        txn.add_exclusive_lock(rid);
        txn.set_state(TransactionState::Growing);
        Ok(true)
    }

    /// Release this transaction's lock on `rid`. Unlocking a rid the
    /// transaction does not hold succeeds vacuously.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        if !txn.is_shared_locked(&rid) && !txn.is_exclusive_locked(&rid) {
            return true;
        }
        debug_assert!(
            !(txn.is_shared_locked(&rid)
                && txn.isolation_level() == IsolationLevel::ReadUncommitted),
            "read-uncommitted transactions never hold shared locks"
        );

        let mut table = self.lock_table.lock();
        let queue = table.entry(rid).or_default();
        // The request may sit at any position in the queue
        let Some(pos) = queue
            .requests
            .iter()
            .position(|request| request.txn.id() == txn.id())
        else {
            return false;
        };
        let request = &queue.requests[pos];
        debug!(
            "txn {} releases its {:?} request (granted: {})",
            txn.id(),
            request.mode,
            request.granted
        );
        let _ = queue.requests.remove(pos);
        queue.cv.notify_all();

        if txn.isolation_level() == IsolationLevel::RepeatableRead
            && txn.state() == TransactionState::Growing
        {
            txn.set_state(TransactionState::Shrinking);
        }
        // Under the weaker levels only an exclusive unlock starts shrinking
        if txn.isolation_level() != IsolationLevel::RepeatableRead
            && txn.state() == TransactionState::Growing
            && txn.is_exclusive_locked(&rid)
        {
            txn.set_state(TransactionState::Shrinking);
        }

        txn.remove_shared_lock(&rid);
        txn.remove_exclusive_lock(&rid);
        true
    }

    /// Sleep on the row's condition variable until another request's
    /// unlock or wound broadcast wakes us
    fn wait(table: &mut MutexGuard<'_, LockTable>, rid: Rid) {
        let Some(queue) = table.get(&rid) else {
            return;
        };
        let cv = queue.cv.clone();
        cv.wait(table);
    }

    /// Mark this transaction's request granted, unless it was aborted
    fn grant(table: &mut MutexGuard<'_, LockTable>, txn: &Arc<Transaction>, rid: Rid) {
        if let Some(queue) = table.get_mut(&rid) {
            for request in queue.requests.iter_mut() {
                if request.txn.id() == txn.id() && txn.state() != TransactionState::Aborted {
                    request.granted = true;
                }
            }
        }
    }

    /// Wound-wait check for a shared request: abort younger exclusive
    /// predecessors, wait on older exclusive predecessors.
    fn need_wait_shared(table: &LockTable, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let Some(queue) = table.get(&rid) else {
            return false;
        };
        let mut need_wait = false;
        let mut wounded = false;
        for request in &queue.requests {
            if request.txn.id() == txn.id() {
                break;
            }
            if request.txn.id() > txn.id() {
                // A younger writer conflicts with our read; wound it
                if request.mode == LockMode::Exclusive
                    && request.txn.state() != TransactionState::Aborted
                {
                    debug!("txn {} wounds younger txn {}", txn.id(), request.txn.id());
                    request.txn.set_state(TransactionState::Aborted);
                    wounded = true;
                }
                continue;
            }
            if request.mode == LockMode::Exclusive {
                need_wait = true;
            }
        }
        if wounded {
            queue.cv.notify_all();
        }
        need_wait
    }

    /// Wound-wait check for an exclusive request: abort every younger
    /// predecessor, wait on any older predecessor.
    fn need_wait_exclusive(table: &LockTable, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let Some(queue) = table.get(&rid) else {
            return false;
        };
        let mut need_wait = false;
        let mut wounded = false;
        for request in &queue.requests {
            if request.txn.id() == txn.id() {
                break;
            }
            if request.txn.id() > txn.id() {
                if request.txn.state() != TransactionState::Aborted {
                    debug!("txn {} wounds younger txn {}", txn.id(), request.txn.id());
                    request.txn.set_state(TransactionState::Aborted);
                    wounded = true;
                }
                continue;
            }
            need_wait = true;
        }
        if wounded {
            queue.cv.notify_all();
        }
        need_wait
    }

    /// Wound-wait check for an upgrade: walk up to our own shared request,
    /// wounding younger predecessors and waiting on older ones. With no
    /// request of ours in the queue there is nothing to wait for.
    fn need_wait_upgrade(table: &LockTable, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let Some(queue) = table.get(&rid) else {
            return false;
        };
        let mut need_wait = false;
        let mut wounded = false;
        let mut request_found = false;
        for request in &queue.requests {
            if request.txn.id() == txn.id() {
                request_found = true;
                break;
            }
            if request.txn.id() > txn.id() {
                if request.txn.state() != TransactionState::Aborted {
                    debug!("txn {} wounds younger txn {}", txn.id(), request.txn.id());
                    request.txn.set_state(TransactionState::Aborted);
                    wounded = true;
                }
                continue;
            }
            need_wait = true;
        }
        if !request_found {
            return false;
        }
        if wounded {
            queue.cv.notify_all();
        }
        need_wait
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
