// Transaction management module

pub mod concurrency;

// Public exports
pub use concurrency::{
    AbortReason, IsolationLevel, LockManager, Transaction, TransactionAbortError,
    TransactionState,
};
pub use concurrency::transaction_manager::TransactionManager;
