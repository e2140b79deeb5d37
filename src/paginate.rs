//! Pagination window arithmetic
//!
//! Pure functions shared by every backend. Reverse addressing lets a caller
//! ask for "the most recent page" (`page = 0, from_end = true`) without
//! knowing the total count, and walk backward deterministically from there.

/// A resolved pagination window.
///
/// `resolved_page` is the concrete zero-based forward page index after
/// reverse arithmetic has been applied; `-1` signals that a reverse request
/// addressed a page before the beginning of the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub resolved_page: i64,
    pub offset: usize,
}

impl PageWindow {
    /// True when the requested page lies before the first page.
    pub fn out_of_range(&self) -> bool {
        self.resolved_page < 0
    }
}

/// Convert `(total, page, page_size, from_end)` into a concrete offset
/// window.
///
/// Forward requests map directly (`offset = page * page_size`). Reverse
/// requests address pages from the end: page 0 is the last page, page 1 the
/// one before it. With no items at all, the resolved page is 0 regardless of
/// the requested index.
pub fn resolve_window(total: usize, page: usize, page_size: usize, from_end: bool) -> PageWindow {
    debug_assert!(page_size >= 1);

    if !from_end {
        return PageWindow {
            resolved_page: page as i64,
            offset: page.saturating_mul(page_size),
        };
    }

    if total == 0 {
        return PageWindow {
            resolved_page: 0,
            offset: 0,
        };
    }

    let last_page = (total - 1) / page_size;
    if page > last_page {
        return PageWindow {
            resolved_page: -1,
            offset: 0,
        };
    }

    let resolved = last_page - page;
    PageWindow {
        resolved_page: resolved as i64,
        offset: resolved * page_size,
    }
}

/// Whether items remain after the returned window.
pub fn has_more(offset: usize, returned: usize, total: usize) -> bool {
    offset + returned < total
}

/// Slice `items` to the window, returning the page and its `has_more` flag.
pub fn window_slice<T: Clone>(items: &[T], window: PageWindow, page_size: usize) -> (Vec<T>, bool) {
    if window.out_of_range() || window.offset >= items.len() {
        return (Vec::new(), false);
    }
    let end = (window.offset + page_size).min(items.len());
    let page = items[window.offset..end].to_vec();
    let more = has_more(window.offset, page.len(), items.len());
    (page, more)
}
