use std::sync::Arc;
use parking_lot::Mutex;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::instance::BufferPoolInstance;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;

/// A buffer pool sharded across independent instances to cut latch
/// contention. Every `page_id`-keyed operation routes to
/// `instances[page_id % num_instances]`; new pages are allocated round-robin
/// across the instances.
pub struct ParallelBufferPool {
    instances: Vec<Arc<BufferPoolInstance>>,
    /// Starting instance for the next `new_page` attempt
    next_instance: Mutex<usize>,
}

impl ParallelBufferPool {
    pub fn new(num_instances: usize, pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(num_instances > 0, "need at least one instance");

        let instances = (0..num_instances)
            .map(|instance_index| {
                Arc::new(BufferPoolInstance::new(
                    pool_size,
                    num_instances as u32,
                    instance_index as u32,
                    disk_manager.clone(),
                ))
            })
            .collect();

        Self {
            instances,
            next_instance: Mutex::new(0),
        }
    }

    /// The instance responsible for a given page
    fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        &self.instances[page_id as usize % self.instances.len()]
    }
}

impl BufferPool for ParallelBufferPool {
    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    /// Try each instance starting at the round-robin cursor until one can
    /// host a new page; the cursor advances by one whether or not any
    /// allocation succeeded.
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut next_instance = self.next_instance.lock();
        let start = *next_instance;
        let num_instances = self.instances.len();

        let mut index = start;
        loop {
            match self.instances[index].new_page() {
                Ok(result) => {
                    *next_instance = (start + 1) % num_instances;
                    return Ok(result);
                }
                Err(_) => {
                    index = (index + 1) % num_instances;
                    if index == start {
                        break;
                    }
                }
            }
        }

        *next_instance = (start + 1) % num_instances;
        Err(BufferPoolError::PoolExhausted)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).flush_page(page_id)
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).delete_page(page_id)
    }

    /// Sum of the frame counts of all instances
    fn pool_size(&self) -> usize {
        self.instances.iter().map(|i| i.pool_size()).sum()
    }
}
