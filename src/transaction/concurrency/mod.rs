// Transaction concurrency module exports

pub mod lock_manager;
pub mod transaction;
pub mod transaction_manager;

// Public exports
pub use lock_manager::{LockManager, LockMode};
pub use transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionAbortError, TransactionState,
};
pub use transaction_manager::TransactionManager;
