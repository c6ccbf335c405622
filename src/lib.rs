// Export public modules
pub mod common;
pub mod index;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use index::hash::ExtendibleHashIndex;
pub use index::hash::HashIndexError;
pub use storage::buffer::{BufferPool, BufferPoolError, BufferPoolInstance, ParallelBufferPool};
pub use storage::disk::DiskManager;
pub use transaction::{LockManager, Transaction, TransactionManager};
