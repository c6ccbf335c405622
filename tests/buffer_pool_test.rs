use anyhow::Result;

mod common;
use common::create_test_buffer_pool;

use stratumdb::storage::buffer::BufferPoolError;

#[test]
fn test_new_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Create a new page
    let (page, page_id) = buffer_pool.new_page()?;

    // A standalone instance allocates IDs from zero with stride one
    assert_eq!(page_id, 0);

    // Check that the page can be accessed
    {
        let page_guard = page.read();
        assert_eq!(page_guard.page_id, page_id);
        assert!(page_guard.data.iter().all(|&b| b == 0));
    }

    // Unpin the page
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_fetch_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Create a new page
    let (_, page_id) = buffer_pool.new_page()?;

    // Unpin the page
    buffer_pool.unpin_page(page_id, false)?;

    // Fetch the page
    let fetched_page = buffer_pool.fetch_page(page_id)?;

    // Check that the page ID matches
    {
        let page_guard = fetched_page.read();
        assert_eq!(page_guard.page_id, page_id);
    }

    // Unpin the fetched page
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_unpin_then_fetch_keeps_data() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Create a new page and modify it
    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        let test_data = b"Test Data";
        page_guard.data[100..100 + test_data.len()].copy_from_slice(test_data);
    }

    // Unpin clean: the page stays resident, so the data must survive
    buffer_pool.unpin_page(page_id, false)?;

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        let test_data = b"Test Data";
        assert_eq!(&page_guard.data[100..100 + test_data.len()], test_data);
    }

    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_dirty_page_survives_eviction() -> Result<()> {
    // Create a buffer pool with just 3 frames
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    // Create 5 pages to force eviction
    let mut page_ids = Vec::new();
    for i in 0..5u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[0] = i + 1;
        }
        buffer_pool.unpin_page(page_id, true)?; // Mark as dirty to force flush
        page_ids.push(page_id);
    }

    // The first page was evicted and flushed; fetch re-reads it from disk
    let first_page = buffer_pool.fetch_page(page_ids[0])?;
    {
        let page_guard = first_page.read();
        assert_eq!(page_guard.page_id, page_ids[0]);
        assert_eq!(page_guard.data[0], 1);
    }

    buffer_pool.unpin_page(page_ids[0], false)?;

    Ok(())
}

#[test]
fn test_all_frames_pinned() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(4)?;

    // Fill every frame with a pinned page
    let mut page_ids = Vec::new();
    for _ in 0..4 {
        let (_, page_id) = buffer_pool.new_page()?;
        page_ids.push(page_id);
    }

    // A fifth page has no frame to live in
    assert!(matches!(
        buffer_pool.new_page(),
        Err(BufferPoolError::PoolExhausted)
    ));

    // Unpinning one dirty page frees its frame for the new page
    {
        let page = buffer_pool.fetch_page(page_ids[0])?;
        let mut page_guard = page.write();
        page_guard.data[0] = 42;
    }
    buffer_pool.unpin_page(page_ids[0], false)?;
    buffer_pool.unpin_page(page_ids[0], true)?;

    let (_, new_page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(new_page_id, false)?;

    // The evicted page was flushed before its frame was reused
    let page = buffer_pool.fetch_page(page_ids[0])?;
    {
        let page_guard = page.read();
        assert_eq!(page_guard.data[0], 42);
    }
    buffer_pool.unpin_page(page_ids[0], false)?;

    Ok(())
}

#[test]
fn test_lru_victim_is_oldest_unpin() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Pin all ten frames, marking each page's data while pinned
    let mut page_ids = Vec::new();
    for i in 0..10u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[0] = i + 1;
        }
        page_ids.push(page_id);
    }

    // Unpin three pages clean, in this order; their data is never flushed
    for &i in &[4usize, 2, 7] {
        buffer_pool.unpin_page(page_ids[i], false)?;
    }

    // The next new page evicts the oldest unpin: page 4
    let (_, new_page_id) = buffer_pool.new_page()?;

    // Pages 2 and 7 are still resident with their in-memory data intact
    for &i in &[2usize, 7] {
        let page = buffer_pool.fetch_page(page_ids[i])?;
        {
            let page_guard = page.read();
            assert_eq!(page_guard.data[0], i as u8 + 1);
        }
    }

    // Every frame is pinned again, so a fetch of the evicted page 4 cannot
    // find a frame, proving it was the victim
    assert!(matches!(
        buffer_pool.fetch_page(page_ids[4]),
        Err(BufferPoolError::PoolExhausted)
    ));

    buffer_pool.unpin_page(new_page_id, false)?;
    buffer_pool.unpin_page(page_ids[2], false)?;
    buffer_pool.unpin_page(page_ids[7], false)?;

    Ok(())
}

#[test]
fn test_flush_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Create a new page and modify it
    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        let test_data = b"Test Data For Flushing";
        page_guard.data[100..100 + test_data.len()].copy_from_slice(test_data);
    }

    buffer_pool.unpin_page(page_id, true)?;

    // Flush the page
    buffer_pool.flush_page(page_id)?;

    // Fetch the page again and verify the data
    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        let test_data = b"Test Data For Flushing";
        assert_eq!(&page_guard.data[100..100 + test_data.len()], test_data);
    }

    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_flush_page_failures() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Flushing the invalid page ID fails
    assert!(matches!(
        buffer_pool.flush_page(-1),
        Err(BufferPoolError::InvalidPageId(-1))
    ));

    // Flushing a page that is not resident fails
    assert!(matches!(
        buffer_pool.flush_page(99),
        Err(BufferPoolError::PageNotFound(99))
    ));

    Ok(())
}

#[test]
fn test_flush_all_pages() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Create several pages and modify them
    let mut page_ids = Vec::new();
    for i in 0..5 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            let test_data = format!("Test Data {}", i).into_bytes();
            page_guard.data[100..100 + test_data.len()].copy_from_slice(&test_data);
        }
        buffer_pool.unpin_page(page_id, true)?; // Mark as dirty
        page_ids.push(page_id);
    }

    // Flush all pages
    buffer_pool.flush_all_pages()?;

    // Fetch each page and verify data
    for (i, &page_id) in page_ids.iter().enumerate() {
        let fetched_page = buffer_pool.fetch_page(page_id)?;
        {
            let page_guard = fetched_page.read();
            let expected_data = format!("Test Data {}", i).into_bytes();
            assert_eq!(
                &page_guard.data[100..100 + expected_data.len()],
                expected_data.as_slice()
            );
        }
        buffer_pool.unpin_page(page_id, false)?;
    }

    Ok(())
}

#[test]
fn test_delete_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Create a new page
    let (_, page_id) = buffer_pool.new_page()?;

    // Deleting a pinned page fails
    assert!(matches!(
        buffer_pool.delete_page(page_id),
        Err(BufferPoolError::PagePinned(_))
    ));

    // Unpin, then delete
    buffer_pool.unpin_page(page_id, false)?;
    buffer_pool.delete_page(page_id)?;

    // Deleting a page that is not resident succeeds vacuously
    buffer_pool.delete_page(page_id)?;

    // The freed frame is reusable
    let (new_page, new_page_id) = buffer_pool.new_page()?;
    {
        let page_guard = new_page.read();
        assert_eq!(page_guard.page_id, new_page_id);
    }
    buffer_pool.unpin_page(new_page_id, false)?;

    Ok(())
}

#[test]
fn test_unpin_is_vacuous_when_possible() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // Unpinning a page that was never created succeeds
    buffer_pool.unpin_page(12, false)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;
    // A second unpin of the same page finds pin count zero and succeeds
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_pin_count_tracks_fetches() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(2)?;

    let (_, page_id) = buffer_pool.new_page()?;
    // Fetch the resident page twice more: pin count is now three
    buffer_pool.fetch_page(page_id)?;
    buffer_pool.fetch_page(page_id)?;

    // The page stays unevictable until the last unpin
    buffer_pool.unpin_page(page_id, false)?;
    buffer_pool.unpin_page(page_id, false)?;
    assert!(matches!(
        buffer_pool.delete_page(page_id),
        Err(BufferPoolError::PagePinned(_))
    ));

    buffer_pool.unpin_page(page_id, false)?;
    buffer_pool.delete_page(page_id)?;

    Ok(())
}
