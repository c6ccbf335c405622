use thiserror::Error;
use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum HashIndexError {
    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),
}
