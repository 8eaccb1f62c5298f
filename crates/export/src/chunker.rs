//! Page partitioning of a resolved range.

use super::error::ExportError;
use super::filter::{ExportFilter, ExportPageParams, ExportRange, Pager};

/// Largest page a renderer is asked to produce.
pub const MAX_PAGE_SIZE: u64 = 50_000;

/// `ceil(count / page_size)`; 0 only for an empty range.
///
/// Callers short-circuit on `count == 0` before partitioning.
pub fn total_pages(count: u64, page_size: u64) -> u64 {
    debug_assert!(page_size > 0, "page size is validated by PageChunker::new");
    count.div_ceil(page_size.max(1))
}

/// Splits a bounded filter into pages of at most `page_size` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChunker {
    page_size: u64,
}

impl PageChunker {
    pub fn new(page_size: u64) -> Result<Self, ExportError> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ExportError::params(format!(
                "page size must be within 1..={MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        Ok(Self { page_size })
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total_pages(&self, count: u64) -> u64 {
        total_pages(count, self.page_size)
    }

    /// One filter+pager pair per page, all sharing the snapshot bound.
    pub fn pages(
        &self,
        filter: &ExportFilter,
        range: &ExportRange,
    ) -> Result<Vec<ExportPageParams>, ExportError> {
        if range.is_empty() {
            return Err(ExportError::EmptyRange);
        }

        let bounded = filter.bounded(range);
        Ok((1..=self.total_pages(range.count))
            .map(|page| ExportPageParams {
                filter: bounded.clone(),
                pager: Pager {
                    page,
                    size: self.page_size,
                },
            })
            .collect())
    }
}
