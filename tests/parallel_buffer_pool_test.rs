use anyhow::Result;

mod common;
use common::create_test_parallel_pool;

use stratumdb::storage::buffer::{BufferPool, BufferPoolError};

#[test]
fn test_round_robin_allocation() -> Result<()> {
    let (pool, _temp_file) = create_test_parallel_pool(3, 5)?;

    // New pages come from instances 0, 1, 2, 0, 1, ... and each instance
    // allocates IDs congruent to its index
    let mut page_ids = Vec::new();
    for i in 0..9 {
        let (_, page_id) = pool.new_page()?;
        assert_eq!(page_id as usize % 3, i % 3);
        page_ids.push(page_id);
    }

    for &page_id in &page_ids {
        pool.unpin_page(page_id, false)?;
    }

    Ok(())
}

#[test]
fn test_operations_route_by_modulus() -> Result<()> {
    let (pool, _temp_file) = create_test_parallel_pool(4, 5)?;

    // Spread pages across all four instances and tag each one
    let mut page_ids = Vec::new();
    for i in 0..8u8 {
        let (page, page_id) = pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[7] = i + 1;
        }
        pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }

    // Each page comes back from its own instance with its own data
    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = pool.fetch_page(page_id)?;
        {
            let page_guard = page.read();
            assert_eq!(page_guard.page_id, page_id);
            assert_eq!(page_guard.data[7], i as u8 + 1);
        }
        pool.unpin_page(page_id, false)?;
        pool.flush_page(page_id)?;
    }

    for &page_id in &page_ids {
        pool.delete_page(page_id)?;
    }

    Ok(())
}

#[test]
fn test_new_page_falls_over_to_free_instance() -> Result<()> {
    // Two instances with a single frame each
    let (pool, _temp_file) = create_test_parallel_pool(2, 1)?;

    let (_, first_id) = pool.new_page()?;
    assert_eq!(first_id, 0);
    let (_, second_id) = pool.new_page()?;
    assert_eq!(second_id, 1);

    // Both instances are full of pinned pages
    assert!(matches!(pool.new_page(), Err(BufferPoolError::PoolExhausted)));

    // Freeing instance 0's frame lets the allocation loop find it even when
    // the round-robin cursor starts elsewhere
    pool.unpin_page(first_id, false)?;
    let (_, third_id) = pool.new_page()?;
    assert_eq!(third_id as usize % 2, 0);
    assert_eq!(third_id, 2);

    pool.unpin_page(second_id, false)?;
    pool.unpin_page(third_id, false)?;

    Ok(())
}

#[test]
fn test_pool_size_sums_instances() -> Result<()> {
    let (pool, _temp_file) = create_test_parallel_pool(3, 5)?;
    assert_eq!(pool.pool_size(), 15);
    Ok(())
}

#[test]
fn test_flush_all_pages_covers_every_instance() -> Result<()> {
    let (pool, _temp_file) = create_test_parallel_pool(3, 4)?;

    let mut page_ids = Vec::new();
    for i in 0..6u8 {
        let (page, page_id) = pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[0] = i + 1;
        }
        pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }

    pool.flush_all_pages()?;

    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = pool.fetch_page(page_id)?;
        {
            let page_guard = page.read();
            assert_eq!(page_guard.data[0], i as u8 + 1);
        }
        pool.unpin_page(page_id, false)?;
    }

    Ok(())
}
