use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;

use stratumdb::storage::buffer::{BufferPoolInstance, ParallelBufferPool};
use stratumdb::storage::disk::DiskManager;

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a single buffer pool instance backed by a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolInstance>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(path)?);
    let buffer_pool = Arc::new(BufferPoolInstance::standalone(pool_size, disk_manager));
    Ok((buffer_pool, file))
}

// Create a parallel buffer pool backed by a temporary database
#[allow(dead_code)]
pub fn create_test_parallel_pool(
    num_instances: usize,
    pool_size: usize,
) -> Result<(Arc<ParallelBufferPool>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(path)?);
    let buffer_pool = Arc::new(ParallelBufferPool::new(num_instances, pool_size, disk_manager));
    Ok((buffer_pool, file))
}
