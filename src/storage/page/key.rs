use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::Rid;

/// Fixed-size binary encoding for keys and values stored inside hash table
/// bucket pages. The encoded form is part of the persisted page layout.
pub trait KeyCodec: Clone {
    /// Encoded size in bytes; every instance encodes to exactly this many
    const ENCODED_SIZE: usize;

    /// Write the encoded form into `buf`, which is `ENCODED_SIZE` bytes
    fn encode(&self, buf: &mut [u8]);

    /// Read an instance back out of `buf`
    fn decode(buf: &[u8]) -> Self;
}

impl KeyCodec for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl KeyCodec for Rid {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(&mut buf[0..4], self.page_id);
        LittleEndian::write_u32(&mut buf[4..8], self.slot_num);
    }

    fn decode(buf: &[u8]) -> Self {
        Rid {
            page_id: LittleEndian::read_i32(&buf[0..4]),
            slot_num: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}

/// An opaque fixed-width index key, used when indexing tuple columns whose
/// serialized form fits in `N` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize> {
    pub data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn new(data: [u8; N]) -> Self {
        Self { data }
    }

    /// Build a key from a prefix of `bytes`, zero-padded to `N`
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }
}

impl<const N: usize> KeyCodec for GenericKey<N> {
    const ENCODED_SIZE: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self { data }
    }
}
