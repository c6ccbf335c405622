use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PageId, PAGE_SIZE};

/// Maximum number of hash bits the directory can use; the directory array
/// is sized for this depth at page-format time
pub const MAX_DEPTH: u32 = 9;

/// Number of slots in the persisted directory arrays
pub const DIRECTORY_ARRAY_SIZE: usize = 1 << MAX_DEPTH;

const PAGE_ID_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;
const DIRECTORY_PAGE_SIZE: usize = BUCKET_PAGE_IDS_OFFSET + 4 * DIRECTORY_ARRAY_SIZE;

// The fixed arrays must fit in one page
const _: () = assert!(DIRECTORY_PAGE_SIZE <= PAGE_SIZE);

/// Typed view over the extendible hash table's directory page.
///
/// Layout (little-endian): `page_id: i32` at 0, `global_depth: u32` at 4,
/// `local_depths: [u8; 512]` at 8, `bucket_page_ids: [i32; 512]` at 520.
pub struct HashDirectoryPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HashDirectoryPage<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data.as_ref()[PAGE_ID_OFFSET..])
    }

    pub fn global_depth(&self) -> u32 {
        LittleEndian::read_u32(&self.data.as_ref()[GLOBAL_DEPTH_OFFSET..])
    }

    /// Mask selecting the `global_depth` low bits of a hash
    pub fn global_depth_mask(&self) -> u32 {
        (1 << self.global_depth()) - 1
    }

    /// Number of directory slots currently in use
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    pub fn local_depth(&self, dir_idx: usize) -> u32 {
        self.data.as_ref()[LOCAL_DEPTHS_OFFSET + dir_idx] as u32
    }

    pub fn bucket_page_id(&self, dir_idx: usize) -> PageId {
        LittleEndian::read_i32(&self.data.as_ref()[BUCKET_PAGE_IDS_OFFSET + 4 * dir_idx..])
    }

    /// The slot paired with `dir_idx` via the high bit of their common
    /// local-depth prefix. Only meaningful for slots with nonzero depth.
    pub fn split_image_index(&self, dir_idx: usize) -> usize {
        let local_depth = self.local_depth(dir_idx);
        debug_assert!(local_depth > 0);
        dir_idx ^ (1 << (local_depth - 1))
    }

    /// The directory may halve only when every bucket uses fewer bits than
    /// the directory itself
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        if global_depth == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < global_depth)
    }

    /// Panic if the directory violates its structural invariants; test and
    /// debug aid
    pub fn verify_integrity(&self) {
        let global_depth = self.global_depth();
        for i in 0..self.size() {
            let local_depth = self.local_depth(i);
            assert!(
                local_depth <= global_depth,
                "slot {} has local depth {} above global depth {}",
                i,
                local_depth,
                global_depth
            );
            // Slots agreeing on the low local-depth bits share one bucket
            let canonical = i & ((1 << local_depth) - 1);
            assert_eq!(
                self.bucket_page_id(i),
                self.bucket_page_id(canonical),
                "slots {} and {} disagree on their bucket page",
                i,
                canonical
            );
            assert_eq!(
                self.local_depth(i),
                self.local_depth(canonical),
                "slots {} and {} disagree on local depth",
                i,
                canonical
            );
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HashDirectoryPage<B> {
    /// Set up a depth-zero directory whose single slot points at the first
    /// bucket page
    pub fn init(&mut self, page_id: PageId, first_bucket_page_id: PageId) {
        self.set_page_id(page_id);
        self.set_global_depth(0);
        self.set_local_depth(0, 0);
        self.set_bucket_page_id(0, first_bucket_page_id);
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        LittleEndian::write_i32(&mut self.data.as_mut()[PAGE_ID_OFFSET..], page_id);
    }

    fn set_global_depth(&mut self, global_depth: u32) {
        LittleEndian::write_u32(&mut self.data.as_mut()[GLOBAL_DEPTH_OFFSET..], global_depth);
    }

    /// Double the directory: every new slot inherits the pointer and local
    /// depth of the slot it mirrors
    pub fn incr_global_depth(&mut self) {
        let old_size = self.size();
        debug_assert!(self.global_depth() < MAX_DEPTH);
        for i in 0..old_size {
            let bucket_page_id = self.bucket_page_id(i);
            let local_depth = self.local_depth(i);
            self.set_bucket_page_id(old_size + i, bucket_page_id);
            self.set_local_depth(old_size + i, local_depth);
        }
        self.set_global_depth(self.global_depth() + 1);
    }

    pub fn decr_global_depth(&mut self) {
        debug_assert!(self.global_depth() > 0);
        self.set_global_depth(self.global_depth() - 1);
    }

    pub fn set_local_depth(&mut self, dir_idx: usize, local_depth: u32) {
        debug_assert!(local_depth <= MAX_DEPTH);
        self.data.as_mut()[LOCAL_DEPTHS_OFFSET + dir_idx] = local_depth as u8;
    }

    pub fn incr_local_depth(&mut self, dir_idx: usize) {
        let local_depth = self.local_depth(dir_idx);
        self.set_local_depth(dir_idx, local_depth + 1);
    }

    pub fn decr_local_depth(&mut self, dir_idx: usize) {
        let local_depth = self.local_depth(dir_idx);
        debug_assert!(local_depth > 0);
        self.set_local_depth(dir_idx, local_depth - 1);
    }

    pub fn set_bucket_page_id(&mut self, dir_idx: usize, bucket_page_id: PageId) {
        LittleEndian::write_i32(
            &mut self.data.as_mut()[BUCKET_PAGE_IDS_OFFSET + 4 * dir_idx..],
            bucket_page_id,
        );
    }
}
