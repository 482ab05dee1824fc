//! Page arithmetic shared by every listing endpoint.
//!
//! Pages are zero-based: `index = 0` is the first page. A request past the last
//! page is not an error, it simply yields no items alongside the real page count.

use crate::error::{Result, ValidationError};
use std::ops::Range;

/// A validated `(size, index)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    size: u64,
    index: u64,
}

impl PageRequest {
    /// Builds a request from raw integers, naming `size_field` / `index_field`
    /// in the error when either is out of range. Size is checked first.
    pub fn new(
        size: i64,
        index: i64,
        size_field: &str,
        index_field: &str,
    ) -> std::result::Result<Self, ValidationError> {
        let size = Self::check_size(size, size_field)?;
        if index < 0 {
            return Err(ValidationError::OutOfRange {
                field: index_field.to_string(),
                value: index,
                requirement: "must not be negative",
            });
        }
        Ok(PageRequest {
            size,
            index: index as u64,
        })
    }

    /// Page sizes must be strictly positive.
    pub fn check_size(size: i64, field: &str) -> std::result::Result<u64, ValidationError> {
        if size <= 0 {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                value: size,
                requirement: "must be positive",
            });
        }
        Ok(size as u64)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Position of the first item on this page, `None` on overflow.
    pub fn offset(&self) -> Option<u64> {
        self.index.checked_mul(self.size)
    }

    pub fn total_pages(&self, total_count: u64) -> u64 {
        total_pages(total_count, self.size)
    }

    /// Item range covered by this page within a collection of `total_count`
    /// items, or `None` if the page lies beyond the end.
    pub fn window(&self, total_count: u64) -> Option<Range<u64>> {
        let start = self.offset()?;
        if start >= total_count {
            return None;
        }
        let end = start.saturating_add(self.size).min(total_count);
        Some(start..end)
    }

    /// Cuts this page out of an already ordered collection.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        match self.window(items.len() as u64) {
            Some(range) => items[range.start as usize..range.end as usize].to_vec(),
            None => Vec::new(),
        }
    }
}

/// `ceil(total_count / page_size)`. A zero page size yields zero pages.
pub fn total_pages(total_count: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_count.div_ceil(page_size)
}

/// One page of a listing plus the numbers needed to navigate the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_pages: u64,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: u64, request: &PageRequest) -> Self {
        Page {
            items,
            total_pages: request.total_pages(total_count),
            total_count,
        }
    }
}

/// Runs a paged store query and derives the page count from its total.
///
/// `query` returns the items for `request` together with the number of
/// matching items across all pages.
pub fn fetch_page<T, F>(request: PageRequest, query: F) -> Result<Page<T>>
where
    F: FnOnce(&PageRequest) -> Result<(Vec<T>, u64)>,
{
    let (mut items, total_count) = query(&request)?;
    if request.window(total_count).is_none() {
        items.clear();
    }
    items.truncate(request.size().min(usize::MAX as u64) as usize);
    Ok(Page::new(items, total_count, &request))
}
