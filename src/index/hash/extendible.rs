use std::hash::Hasher;
use std::marker::PhantomData;
use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;
use siphasher::sip::SipHasher13;

use crate::common::types::PageId;
use crate::index::hash::error::HashIndexError;
use crate::storage::buffer::BufferPool;
use crate::storage::page::bucket_page::HashBucketPage;
use crate::storage::page::directory_page::{HashDirectoryPage, MAX_DEPTH};
use crate::storage::page::key::KeyCodec;

/// A persistent extendible hash index over (key, value) pairs, stored in
/// pages managed by the buffer pool.
///
/// Latching discipline: the table-wide latch is taken shared on the fast
/// paths (search, in-bucket insert, remove) and exclusive for structural
/// changes (split, merge). Inside a path, the bucket page's frame latch
/// guards the in-page work. Every fetched page is unpinned on every exit,
/// dirty iff it was mutated.
pub struct ExtendibleHashIndex<K, V> {
    buffer_pool: Arc<dyn BufferPool>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> ExtendibleHashIndex<K, V>
where
    K: KeyCodec + PartialEq,
    V: KeyCodec + PartialEq,
{
    /// Create an index with a depth-zero directory pointing at one empty
    /// bucket
    pub fn new(buffer_pool: Arc<dyn BufferPool>) -> Result<Self, HashIndexError> {
        let (bucket_page, bucket_page_id) = buffer_pool.new_page()?;
        {
            let mut guard = bucket_page.write();
            let mut bucket = HashBucketPage::<_, K, V>::new(&mut guard.data[..]);
            bucket.init();
        }
        buffer_pool.unpin_page(bucket_page_id, true)?;

        let (dir_page, directory_page_id) = buffer_pool.new_page()?;
        {
            let mut guard = dir_page.write();
            let mut directory = HashDirectoryPage::new(&mut guard.data[..]);
            directory.init(directory_page_id, bucket_page_id);
        }
        buffer_pool.unpin_page(directory_page_id, true)?;

        Ok(Self {
            buffer_pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// 32-bit hash of a key's encoded form
    fn hash(key: &K) -> u32 {
        let mut buf = vec![0u8; K::ENCODED_SIZE];
        key.encode(&mut buf);
        let mut hasher = SipHasher13::new_with_keys(0, 0);
        hasher.write(&buf);
        hasher.finish() as u32
    }

    /// Collect every value stored under `key`
    pub fn get_value(&self, key: &K) -> Result<Vec<V>, HashIndexError> {
        let _table = self.table_latch.read();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let bucket_page_id = {
            let guard = dir_page.read();
            let directory = HashDirectoryPage::new(&guard.data[..]);
            let dir_idx = (Self::hash(key) & directory.global_depth_mask()) as usize;
            directory.bucket_page_id(dir_idx)
        };

        let bucket_page = match self.buffer_pool.fetch_page(bucket_page_id) {
            Ok(page) => page,
            Err(e) => {
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(e.into());
            }
        };
        let values = {
            let guard = bucket_page.read();
            let bucket = HashBucketPage::<_, K, V>::new(&guard.data[..]);
            bucket.get_value(key)
        };

        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(values)
    }

    /// Insert a (key, value) pair. Returns false on a duplicate pair, or
    /// when the target bucket is full and no further split is possible.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        loop {
            let mut bucket_full = false;
            let inserted;
            {
                let _table = self.table_latch.read();

                let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
                let bucket_page_id = {
                    let guard = dir_page.read();
                    let directory = HashDirectoryPage::new(&guard.data[..]);
                    let dir_idx = (Self::hash(key) & directory.global_depth_mask()) as usize;
                    directory.bucket_page_id(dir_idx)
                };

                let bucket_page = match self.buffer_pool.fetch_page(bucket_page_id) {
                    Ok(page) => page,
                    Err(e) => {
                        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                        return Err(e.into());
                    }
                };
                inserted = {
                    let mut guard = bucket_page.write();
                    let mut bucket = HashBucketPage::<_, K, V>::new(&mut guard.data[..]);
                    if bucket.is_full() {
                        bucket_full = true;
                        false
                    } else {
                        bucket.insert(key, value)
                    }
                };

                self.buffer_pool.unpin_page(bucket_page_id, inserted)?;
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            }

            if !bucket_full {
                return Ok(inserted);
            }
            // The bucket is full; split it and retry. A single split may be
            // insufficient when every entry rehashes to one side, so the
            // loop continues until the insert lands or the split is refused.
            if !self.split_insert(key)? {
                return Ok(false);
            }
        }
    }

    /// Split the bucket the key maps to, under the exclusive table latch.
    /// Returns false when the bucket already uses `MAX_DEPTH` hash bits.
    fn split_insert(&self, key: &K) -> Result<bool, HashIndexError> {
        let _table = self.table_latch.write();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut dir_guard = dir_page.write();
        let mut directory = HashDirectoryPage::new(&mut dir_guard.data[..]);

        let split_idx = (Self::hash(key) & directory.global_depth_mask()) as usize;
        let split_depth = directory.local_depth(split_idx);

        if split_depth >= MAX_DEPTH {
            drop(directory);
            drop(dir_guard);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(false);
        }

        let split_page_id = directory.bucket_page_id(split_idx);

        // Fetch the bucket and allocate its image before touching the
        // directory, so an exhausted pool cannot leave it half-updated
        let split_page = match self.buffer_pool.fetch_page(split_page_id) {
            Ok(page) => page,
            Err(e) => {
                drop(directory);
                drop(dir_guard);
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(e.into());
            }
        };
        let (image_page, image_page_id) = match self.buffer_pool.new_page() {
            Ok(result) => result,
            Err(e) => {
                drop(directory);
                drop(dir_guard);
                self.buffer_pool.unpin_page(split_page_id, false)?;
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(e.into());
            }
        };

        if split_depth == directory.global_depth() {
            directory.incr_global_depth();
        }
        directory.incr_local_depth(split_idx);
        let new_depth = directory.local_depth(split_idx);
        debug!(
            "splitting bucket page {} at depth {} (global depth {})",
            split_page_id,
            new_depth,
            directory.global_depth()
        );

        // Rewire every slot sharing the old prefix: the bit just below the
        // new depth picks between the original bucket and its image
        let prefix_mask = (1usize << (new_depth - 1)) - 1;
        let high_bit = 1usize << (new_depth - 1);
        for dir_idx in 0..directory.size() {
            if dir_idx & prefix_mask == split_idx & prefix_mask {
                if dir_idx & high_bit == split_idx & high_bit {
                    directory.set_bucket_page_id(dir_idx, split_page_id);
                } else {
                    directory.set_bucket_page_id(dir_idx, image_page_id);
                }
                directory.set_local_depth(dir_idx, new_depth);
            }
        }

        // Rehash the original bucket's entries into the two buckets
        {
            let mut split_guard = split_page.write();
            let mut split_bucket = HashBucketPage::<_, K, V>::new(&mut split_guard.data[..]);
            let mut image_guard = image_page.write();
            let mut image_bucket = HashBucketPage::<_, K, V>::new(&mut image_guard.data[..]);
            image_bucket.init();

            let mask = directory.global_depth_mask();
            for bucket_idx in 0..HashBucketPage::<&[u8], K, V>::CAPACITY {
                if !split_bucket.is_readable(bucket_idx) {
                    continue;
                }
                let entry_key = split_bucket.key_at(bucket_idx);
                let target_idx = (Self::hash(&entry_key) & mask) as usize;
                if directory.bucket_page_id(target_idx) == image_page_id {
                    let entry_value = split_bucket.value_at(bucket_idx);
                    image_bucket.insert(&entry_key, &entry_value);
                    split_bucket.remove_at(bucket_idx);
                }
            }
        }

        drop(directory);
        drop(dir_guard);
        self.buffer_pool.unpin_page(split_page_id, true)?;
        self.buffer_pool.unpin_page(image_page_id, true)?;
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        Ok(true)
    }

    /// Remove a (key, value) pair. An emptied bucket triggers a merge
    /// attempt with its split image.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let removed;
        let now_empty;
        {
            let _table = self.table_latch.read();

            let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
            let bucket_page_id = {
                let guard = dir_page.read();
                let directory = HashDirectoryPage::new(&guard.data[..]);
                let dir_idx = (Self::hash(key) & directory.global_depth_mask()) as usize;
                directory.bucket_page_id(dir_idx)
            };

            let bucket_page = match self.buffer_pool.fetch_page(bucket_page_id) {
                Ok(page) => page,
                Err(e) => {
                    self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    return Err(e.into());
                }
            };
            {
                let mut guard = bucket_page.write();
                let mut bucket = HashBucketPage::<_, K, V>::new(&mut guard.data[..]);
                removed = bucket.remove(key, value);
                now_empty = bucket.is_empty();
            }

            self.buffer_pool.unpin_page(bucket_page_id, removed)?;
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        }

        if now_empty {
            self.merge(key)?;
        }
        Ok(removed)
    }

    /// Fold an empty bucket into its split image and shrink the directory
    /// as far as possible. Bails out when the bucket refilled in the
    /// meantime, sits at depth zero, or is asymmetric with its image.
    fn merge(&self, key: &K) -> Result<(), HashIndexError> {
        let _table = self.table_latch.write();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut dir_guard = dir_page.write();
        let mut directory = HashDirectoryPage::new(&mut dir_guard.data[..]);

        let target_idx = (Self::hash(key) & directory.global_depth_mask()) as usize;
        if target_idx >= directory.size() {
            drop(directory);
            drop(dir_guard);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        }

        let target_page_id = directory.bucket_page_id(target_idx);
        let local_depth = directory.local_depth(target_idx);
        if local_depth == 0 {
            drop(directory);
            drop(dir_guard);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        }

        // Only symmetric pairs merge
        let image_idx = directory.split_image_index(target_idx);
        if local_depth != directory.local_depth(image_idx) {
            drop(directory);
            drop(dir_guard);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        }

        let target_page = match self.buffer_pool.fetch_page(target_page_id) {
            Ok(page) => page,
            Err(e) => {
                drop(directory);
                drop(dir_guard);
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(e.into());
            }
        };
        let target_empty = {
            let guard = target_page.read();
            let bucket = HashBucketPage::<_, K, V>::new(&guard.data[..]);
            bucket.is_empty()
        };
        self.buffer_pool.unpin_page(target_page_id, false)?;
        if !target_empty {
            drop(directory);
            drop(dir_guard);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        }

        self.buffer_pool.delete_page(target_page_id)?;

        let image_page_id = directory.bucket_page_id(image_idx);
        directory.set_bucket_page_id(target_idx, image_page_id);
        directory.decr_local_depth(target_idx);
        directory.decr_local_depth(image_idx);

        // Every slot that pointed at either bucket now points at the image
        let merged_depth = directory.local_depth(target_idx);
        for dir_idx in 0..directory.size() {
            let page_id = directory.bucket_page_id(dir_idx);
            if page_id == target_page_id || page_id == image_page_id {
                directory.set_bucket_page_id(dir_idx, image_page_id);
                directory.set_local_depth(dir_idx, merged_depth);
            }
        }

        while directory.can_shrink() {
            directory.decr_global_depth();
        }
        debug!(
            "merged bucket page {} into {} (global depth {})",
            target_page_id,
            image_page_id,
            directory.global_depth()
        );

        drop(directory);
        drop(dir_guard);
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        Ok(())
    }

    /// Current number of hash bits used by the directory
    pub fn global_depth(&self) -> Result<u32, HashIndexError> {
        let _table = self.table_latch.read();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let global_depth = {
            let guard = dir_page.read();
            HashDirectoryPage::new(&guard.data[..]).global_depth()
        };
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(global_depth)
    }

    /// Panic if the directory violates its structural invariants
    pub fn verify_integrity(&self) -> Result<(), HashIndexError> {
        let _table = self.table_latch.read();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        {
            let guard = dir_page.read();
            HashDirectoryPage::new(&guard.data[..]).verify_integrity();
        }
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(())
    }
}
