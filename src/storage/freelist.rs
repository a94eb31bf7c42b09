//! Free-page allocation.
//!
//! Unused pages form a stack threaded through the file: the header page names
//! the head, and every free page stores the offset of the next one (0 ends the
//! list). Allocation pops the head and release pushes onto it. When the stack
//! is empty the file grows by a batch of pages which are linked into a fresh
//! chain first.
//!
//! Every change to the resident header is persisted immediately. If that
//! write fails the in-memory header is restored before the error is returned,
//! so memory and disk never disagree about the list head.

use log::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::storage::page::{is_aligned, FreePage, PAGE_SIZE};
use crate::storage::pager::Pager;

impl Pager {
    /// Hand out an unused page, growing the file when the free list is empty.
    pub fn allocate_page(&mut self) -> DbResult<u64> {
        if self.header().free_page_offset == 0 {
            let batch = self.options().free_page_batch;
            self.extend_free_list(batch)
                .map_err(|e| DbError::Allocation(Box::new(e)))?;
        }

        let head = self.header().free_page_offset;
        let free = FreePage::decode(&self.read_page(head)?);
        self.header_mut().free_page_offset = free.next_free_page_offset;
        if let Err(e) = self.sync_header() {
            warn!("rolling back allocation of page {head}: {e}");
            self.header_mut().free_page_offset = head;
            return Err(DbError::Allocation(Box::new(e)));
        }

        debug!("allocated page {head}");
        Ok(head)
    }

    /// Return `offset` to the free list.
    pub fn release_page(&mut self, offset: u64) -> DbResult<()> {
        if !is_aligned(offset) {
            return Err(DbError::MisalignedOffset(offset));
        }
        let page_count = self.header().page_count;
        if offset == 0 || offset >= self.header().file_end() {
            return Err(DbError::OffsetOutOfRange { offset, page_count });
        }

        let head = self.header().free_page_offset;
        self.write_page(&FreePage { next_free_page_offset: head }.encode(offset))?;
        self.header_mut().free_page_offset = offset;
        if let Err(e) = self.sync_header() {
            warn!("rolling back release of page {offset}: {e}");
            self.header_mut().free_page_offset = head;
            return Err(DbError::Allocation(Box::new(e)));
        }

        debug!("released page {offset}");
        Ok(())
    }

    /// Offsets on the free list, head first.
    pub fn free_pages(&mut self) -> DbResult<Vec<u64>> {
        let mut pages = Vec::new();
        let mut next = self.header().free_page_offset;
        while next != 0 {
            if pages.len() as u64 >= self.header().page_count {
                return Err(DbError::Corrupt("free list does not terminate".into()));
            }
            pages.push(next);
            next = FreePage::decode(&self.read_page(next)?).next_free_page_offset;
        }
        Ok(pages)
    }

    /// Grow the file by `count` pages and push them, in ascending order, onto the free list.
    fn extend_free_list(&mut self, count: u64) -> DbResult<()> {
        let previous = *self.header();
        let first = previous.file_end();
        {
            let header = self.header_mut();
            header.page_count += count;
            header.free_page_offset = first;
        }

        if let Err(e) = self.write_free_chain(first, count, previous.free_page_offset) {
            warn!("rolling back free list extension at {first}: {e}");
            *self.header_mut() = previous;
            return Err(e);
        }

        debug!(
            "extended free list by {} pages starting at {}",
            count, first
        );
        Ok(())
    }

    fn write_free_chain(&mut self, first: u64, count: u64, tail: u64) -> DbResult<()> {
        let stride = PAGE_SIZE as u64;
        for i in 0..count {
            let next = if i + 1 < count { first + (i + 1) * stride } else { tail };
            let page = FreePage { next_free_page_offset: next }.encode(first + i * stride);
            self.write_page(&page)?;
        }
        self.sync_header()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::config::{DbOptions, Synchronous};
    use crate::error::DbError;
    use crate::storage::pager::Pager;

    fn open(batch: u64) -> (tempfile::TempDir, Pager) {
        let dir = tempfile::tempdir().unwrap();
        let options = DbOptions::default()
            .synchronous(Synchronous::Off)
            .free_page_batch(batch);
        let pager = Pager::open(dir.path().join("free.db"), options).unwrap();
        (dir, pager)
    }

    #[test]
    fn first_allocation_extends_file_by_a_batch() {
        // given an empty database
        let (_dir, mut pager) = open(10);

        // when allocating one page
        let page = pager.allocate_page().unwrap();

        // then the first carved page is returned and the rest stay on the list
        assert_eq!(page, 0x1000);
        assert_eq!(pager.header().page_count, 11);
        assert_eq!(pager.header().free_page_offset, 0x2000);
        assert_eq!(pager.free_pages().unwrap().len(), 9);
        assert_eq!(pager.file_length_pages().unwrap(), 11);
    }

    #[test]
    fn released_page_is_reused_first() {
        let (_dir, mut pager) = open(4);
        let a = pager.allocate_page().unwrap();
        let b = pager.allocate_page().unwrap();

        pager.release_page(a).unwrap();
        assert_eq!(pager.header().free_page_offset, a);
        assert_eq!(pager.allocate_page().unwrap(), a);
        assert_ne!(a, b);
    }

    #[test]
    fn allocations_are_distinct_across_batches() {
        let (_dir, mut pager) = open(3);
        let mut seen = HashSet::new();
        for _ in 0..20 {
            assert!(seen.insert(pager.allocate_page().unwrap()));
        }
        assert_eq!(pager.header().page_count, 1 + 21);
        assert_eq!(pager.free_pages().unwrap().len(), 1);
    }

    #[test]
    fn free_list_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");
        let options = DbOptions::default().synchronous(Synchronous::Off);
        let released = {
            let mut pager = Pager::open(&path, options.clone()).unwrap();
            let a = pager.allocate_page().unwrap();
            let _b = pager.allocate_page().unwrap();
            pager.release_page(a).unwrap();
            a
        };

        let mut pager = Pager::open(&path, options).unwrap();
        assert_eq!(pager.free_pages().unwrap()[0], released);
        assert_eq!(pager.allocate_page().unwrap(), released);
    }

    #[test]
    fn failed_extension_rolls_header_back() {
        // given an empty database whose header page cannot be written
        let (_dir, mut pager) = open(4);
        let before = *pager.header();
        pager.fail_writes_at(Some(0));

        // when the first allocation has to grow the file
        let result = pager.allocate_page();

        // then the error is an allocation failure and nothing was carved
        match result {
            Err(DbError::Allocation(source)) => assert!(matches!(*source, DbError::Io(_))),
            other => panic!("expected allocation failure, got {other:?}"),
        }
        assert_eq!(*pager.header(), before);

        pager.fail_writes_at(None);
        assert_eq!(pager.allocate_page().unwrap(), 0x1000);
        assert_eq!(pager.header().page_count, 5);
    }

    #[test]
    fn failed_chain_write_rolls_header_back() {
        let (_dir, mut pager) = open(4);
        let before = *pager.header();
        pager.fail_writes_at(Some(0x3000));

        assert!(matches!(pager.allocate_page(), Err(DbError::Allocation(_))));
        assert_eq!(*pager.header(), before);
    }

    #[test]
    fn failed_pop_keeps_list_head() {
        // given a free list with pages left on it
        let (_dir, mut pager) = open(4);
        pager.allocate_page().unwrap();
        let head = pager.header().free_page_offset;

        // when popping fails to persist the header
        pager.fail_writes_at(Some(0));
        assert!(matches!(pager.allocate_page(), Err(DbError::Allocation(_))));

        // then the same page is still first in line
        assert_eq!(pager.header().free_page_offset, head);
        pager.fail_writes_at(None);
        assert_eq!(pager.allocate_page().unwrap(), head);
    }

    #[test]
    fn failed_release_keeps_list_head() {
        let (_dir, mut pager) = open(4);
        let page = pager.allocate_page().unwrap();
        let head = pager.header().free_page_offset;

        pager.fail_writes_at(Some(0));
        assert!(matches!(pager.release_page(page), Err(DbError::Allocation(_))));
        pager.fail_writes_at(None);

        assert_eq!(pager.header().free_page_offset, head);
        assert!(!pager.free_pages().unwrap().contains(&page));
    }

    #[test]
    fn releasing_invalid_offsets_fails() {
        let (_dir, mut pager) = open(2);
        pager.allocate_page().unwrap();

        assert!(matches!(pager.release_page(0), Err(DbError::OffsetOutOfRange { .. })));
        assert!(matches!(pager.release_page(0x1010), Err(DbError::MisalignedOffset(_))));
        assert!(matches!(pager.release_page(0x9000), Err(DbError::OffsetOutOfRange { .. })));
    }
}
