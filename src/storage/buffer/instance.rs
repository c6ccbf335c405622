use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{FrameId, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;

/// Per-frame bookkeeping, guarded by the instance latch
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl FrameMeta {
    fn new() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

/// All mutable pool state transitions are serialized by one latch
struct PoolState {
    frames: Vec<FrameMeta>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// One shard of the buffer pool: a fixed set of frames caching disk pages,
/// with pin counting and LRU replacement.
///
/// Page IDs are allocated with stride `num_instances` starting at
/// `instance_index`, so every page this instance produces routes back to it
/// under the parallel pool's modulus.
pub struct BufferPoolInstance {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    /// Page data, one slot per frame; the RwLock on each page is the
    /// frame-local latch callers take while reading or mutating page bytes
    pages: Vec<PagePtr>,
    replacer: LruReplacer,
    state: Mutex<PoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolInstance {
    pub fn new(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "instance must belong to a pool of at least one");
        assert!(
            instance_index < num_instances,
            "instance index out of range for the pool"
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        // Initially, every frame is on the free list
        for frame_id in 0..pool_size {
            frames.push(FrameMeta::new());
            pages.push(Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            pages,
            replacer: LruReplacer::new(pool_size),
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index as PageId,
            }),
            disk_manager,
        }
    }

    /// Single-instance pool, for callers that do not shard
    pub fn standalone(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::new(pool_size, 1, 0, disk_manager)
    }

    /// Fetch a page from the buffer pool or disk. The returned page is
    /// pinned until a matching `unpin_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID || page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        // Already resident: just take another pin
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.frames[frame_id].pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(self.pages[frame_id].clone());
        }

        let frame_id = self.find_replacement(&mut state)?;

        let read_result = {
            let mut page = self.pages[frame_id].write();
            self.disk_manager.read_page(page_id, &mut page)
        };
        if let Err(e) = read_result {
            // The frame was already detached from its old page; hand it back
            let meta = &mut state.frames[frame_id];
            meta.page_id = INVALID_PAGE_ID;
            meta.pin_count = 0;
            meta.is_dirty = false;
            state.free_list.push_back(frame_id);
            return Err(e.into());
        }

        let meta = &mut state.frames[frame_id];
        meta.page_id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;
        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok(self.pages[frame_id].clone())
    }

    /// Create a new page with a freshly allocated ID. Fails when every frame
    /// is pinned.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        if state.frames.iter().all(|f| f.pin_count > 0) {
            return Err(BufferPoolError::PoolExhausted);
        }

        let frame_id = self.find_replacement(&mut state)?;
        let page_id = self.allocate_page(&mut state);

        {
            let mut page = self.pages[frame_id].write();
            page.reset();
            page.page_id = page_id;
        }

        let meta = &mut state.frames[frame_id];
        meta.page_id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;
        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok((self.pages[frame_id].clone(), page_id))
    }

    /// Drop one pin on a page, folding `is_dirty` into the frame's dirty
    /// bit. Unpinning a page that is not resident, or whose pin count is
    /// already zero, succeeds without effect.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(());
        };

        let meta = &mut state.frames[frame_id];
        if is_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            return Ok(());
        }
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write a resident page to disk and clear its dirty bit. Flushing a
    /// pinned page is legal.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Err(BufferPoolError::PageNotFound(page_id));
        };

        state.frames[frame_id].is_dirty = false;
        let page = self.pages[frame_id].read();
        self.disk_manager.write_page(&page)?;

        Ok(())
    }

    /// Write every resident page to disk, dirty or not
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let state = self.state.lock();

        for (&page_id, &frame_id) in state.page_table.iter() {
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            let page = self.pages[frame_id].read();
            self.disk_manager.write_page(&page)?;
        }

        Ok(())
    }

    /// Remove a page from the pool and return its frame to the free list.
    /// Deleting a non-resident page succeeds; deleting a pinned page fails.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        self.disk_manager.deallocate_page(page_id);

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(());
        };

        if state.frames[frame_id].pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        state.page_table.remove(&page_id);
        let meta = &mut state.frames[frame_id];
        meta.page_id = INVALID_PAGE_ID;
        meta.pin_count = 0;
        meta.is_dirty = false;
        {
            let mut page = self.pages[frame_id].write();
            page.reset();
        }
        self.replacer.pin(frame_id);
        state.free_list.push_back(frame_id);

        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Obtain a frame for a new resident: free list first, then the
    /// replacer. An evicted victim is flushed if dirty and dropped from the
    /// page table.
    fn find_replacement(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(victim_id) = self.replacer.victim() else {
            return Err(BufferPoolError::PoolExhausted);
        };

        let (old_page_id, was_dirty) = {
            let meta = &mut state.frames[victim_id];
            meta.pin_count = 0;
            (meta.page_id, meta.is_dirty)
        };
        if was_dirty {
            let page = self.pages[victim_id].read();
            if let Err(e) = self.disk_manager.write_page(&page) {
                // The victim stays resident and evictable if its flush fails
                drop(page);
                self.replacer.unpin(victim_id);
                return Err(e.into());
            }
        }
        state.page_table.remove(&old_page_id);
        debug!(
            "instance {}: evicted page {} from frame {}",
            self.instance_index, old_page_id, victim_id
        );

        Ok(victim_id)
    }

    /// Hand out the next page ID for this instance; stride allocation keeps
    /// `page_id % num_instances == instance_index`
    fn allocate_page(&self, state: &mut PoolState) -> PageId {
        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances as PageId;
        debug_assert_eq!(
            page_id.rem_euclid(self.num_instances as PageId) as u32,
            self.instance_index
        );
        page_id
    }
}

impl BufferPool for BufferPoolInstance {
    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        BufferPoolInstance::fetch_page(self, page_id)
    }

    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        BufferPoolInstance::new_page(self)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        BufferPoolInstance::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        BufferPoolInstance::flush_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        BufferPoolInstance::flush_all_pages(self)
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        BufferPoolInstance::delete_page(self, page_id)
    }

    fn pool_size(&self) -> usize {
        BufferPoolInstance::pool_size(self)
    }
}
