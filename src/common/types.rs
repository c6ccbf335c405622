use std::sync::Arc;
use parking_lot::RwLock;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type; negative values are never allocated
pub type PageId = i32;

/// Reserved page ID marking an empty frame or a missing page
pub const INVALID_PAGE_ID: PageId = -1;

/// Buffer pool frame ID type, an index into the frame array
pub type FrameId = usize;

/// Transaction ID type; smaller IDs are older transactions
pub type TxnId = u32;

/// Record ID: a page plus a slot within that page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }
}

/// Page structure
#[derive(Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }

    /// Zero the data and drop the page identity, returning the frame to a
    /// blank state
    pub fn reset(&mut self) {
        self.data = [0; PAGE_SIZE];
        self.page_id = INVALID_PAGE_ID;
    }
}

/// Smart pointer to a page; the RwLock is the frame-local latch
pub type PagePtr = Arc<RwLock<Page>>;
