//! Paged file content.
//!
//! File bytes live in fixed-size pages keyed by `offset / PAGE_SIZE`.
//! Pages that were never written are holes: they take no memory and read
//! back as zeroes. Nothing is ever written back anywhere; the dirty set
//! only exists so the host's page cache can be told which blocks changed.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{FsError, FsResult};

/// Size of one content page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Largest size a regular file may grow to.
pub const MAX_FILE_SIZE: u64 = i64::MAX as u64;

fn try_page() -> FsResult<Box<[u8]>> {
    let mut data = Vec::new();
    data.try_reserve_exact(PAGE_SIZE)
        .map_err(|_| FsError::OutOfMemory)?;
    data.resize(PAGE_SIZE, 0);
    Ok(data.into_boxed_slice())
}

/// Sparse sequence of pages holding a regular file's bytes.
#[derive(Debug, Clone, Default)]
pub struct PageStore {
    pages: BTreeMap<u64, Box<[u8]>>,
    dirty: BTreeSet<u64>,
    size: u64,
}

fn page_index(offset: u64) -> u64 {
    offset / PAGE_SIZE as u64
}

fn page_offset(offset: u64) -> usize {
    (offset % PAGE_SIZE as u64) as usize
}

impl PageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical length in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Returns true if the store holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of pages actually backed by memory.
    pub fn allocated_pages(&self) -> usize {
        self.pages.len()
    }

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Short at end of content, empty at or past it. Holes read as zeroes.
    pub fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        if offset >= self.size {
            return Vec::new();
        }
        let end = offset.saturating_add(len as u64).min(self.size);
        let mut out = Vec::with_capacity((end - offset) as usize);

        let mut pos = offset;
        while pos < end {
            let start = page_offset(pos);
            let take = (PAGE_SIZE - start).min((end - pos) as usize);
            match self.pages.get(&page_index(pos)) {
                Some(page) => out.extend_from_slice(&page[start..start + take]),
                None => out.resize(out.len() + take, 0),
            }
            pos += take as u64;
        }
        out
    }

    /// Allocate every page a write of `[offset, offset + len)` will touch.
    ///
    /// Either all pages are allocated or none are; the store is unchanged
    /// on failure. Pages outside the range stay holes.
    pub fn reserve(&mut self, offset: u64, len: usize) -> FsResult<()> {
        if len == 0 {
            return Ok(());
        }
        let end = offset
            .checked_add(len as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or(FsError::FileTooLarge)?;

        let mut fresh = Vec::new();
        for idx in page_index(offset)..=page_index(end - 1) {
            if !self.pages.contains_key(&idx) {
                fresh
                    .try_reserve(1)
                    .map_err(|_| FsError::OutOfMemory)?;
                fresh.push((idx, try_page()?));
            }
        }
        self.pages.extend(fresh);
        Ok(())
    }

    /// Write `bytes` at `offset`, growing the store. Any gap becomes a hole.
    ///
    /// Touched pages join the dirty set; see [`PageStore::take_dirty`].
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> FsResult<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }
        self.reserve(offset, bytes.len())?;

        let mut pos = offset;
        let mut src = bytes;
        while !src.is_empty() {
            let idx = page_index(pos);
            let start = page_offset(pos);
            let take = (PAGE_SIZE - start).min(src.len());
            let page = self
                .pages
                .get_mut(&idx)
                .ok_or_else(|| FsError::other("page missing after reserve"))?;
            page[start..start + take].copy_from_slice(&src[..take]);
            self.dirty.insert(idx);
            src = &src[take..];
            pos += take as u64;
        }

        self.size = self.size.max(pos);
        Ok(bytes.len())
    }

    /// Drop or zero-extend content to exactly `new_size` bytes.
    pub fn truncate(&mut self, new_size: u64) -> FsResult<()> {
        if new_size > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }
        if new_size < self.size {
            let keep = page_index(new_size + PAGE_SIZE as u64 - 1);
            self.pages.retain(|idx, _| *idx < keep);
            self.dirty.retain(|idx| *idx < keep);
            // Zero the tail of the last partial page so a later extension
            // reads zeroes, not stale bytes.
            let tail = page_offset(new_size);
            if tail != 0 {
                let idx = page_index(new_size);
                if let Some(page) = self.pages.get_mut(&idx) {
                    page[tail..].fill(0);
                    self.dirty.insert(idx);
                }
            }
        }
        self.size = new_size;
        Ok(())
    }

    /// Indices of dirty pages in ascending order, clearing the set.
    pub fn take_dirty(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }
}
