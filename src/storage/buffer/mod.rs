pub mod error;
pub mod instance;
pub mod parallel;
pub mod replacer;

pub use error::BufferPoolError;
pub use instance::BufferPoolInstance;
pub use parallel::ParallelBufferPool;

use crate::common::types::{PageId, PagePtr};

/// The page-cache interface the index and other page consumers are written
/// against. Implemented by a single [`BufferPoolInstance`] and by the
/// sharded [`ParallelBufferPool`].
///
/// Every successful `fetch_page`/`new_page` must be paired with an
/// `unpin_page`; a leaked pin eventually starves the pool.
pub trait BufferPool: Send + Sync {
    /// Fetch the page with the given ID, reading it from disk if it is not
    /// resident. The returned page is pinned.
    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError>;

    /// Allocate a fresh page ID and return a pinned, zeroed page for it
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError>;

    /// Drop one pin on the page, folding `is_dirty` into its dirty bit
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError>;

    /// Write the page's data to disk and clear its dirty bit
    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;

    /// Write every resident page's data to disk
    fn flush_all_pages(&self) -> Result<(), BufferPoolError>;

    /// Drop the page from the pool and return its frame to the free list.
    /// Fails when the page is still pinned.
    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;

    /// Total number of frames
    fn pool_size(&self) -> usize;
}
