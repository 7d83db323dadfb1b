//! Page arithmetic for the block listing. Pure functions so the
//! reconciliation rules are testable without a backend.

/// What to do with the current page after a collection-size-changing
/// mutation, given the fresh count returned by the follow-up fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    Stay,
    StepBack,
    RefreshOnly,
}

/// Last valid page for a collection. An empty collection still has page 1 as
/// its only valid page.
pub fn last_page(count: u64, page_size: u32) -> u32 {
    let size = page_size.max(1) as u64;
    let pages = count.div_ceil(size).max(1);
    pages.min(u32::MAX as u64) as u32
}

/// Page the next created block will land on. The backend appends, so a
/// creation on an exactly-full last page spills onto a fresh page.
pub fn creation_landing_page(count: u64, page_size: u32) -> u32 {
    let size = page_size.max(1) as u64;
    let mut next = last_page(count, page_size);
    if count > 0 && count % size == 0 {
        next += 1;
    }
    next
}

/// Target page when a fetch came back for a page beyond the end of the
/// collection, using the count returned by that very fetch. Fetching the
/// returned target can never overshoot again, so one correction converges.
pub fn overflow_target(count: u64, page_size: u32, requested_page: u32) -> Option<u32> {
    let last = last_page(count, page_size);
    (requested_page > last).then_some(last)
}

/// Decision table evaluated after a mutation, on the fetch result it
/// triggered.
pub fn reconcile(count: u64, page_size: u32, current_page: u32, items_on_page: usize) -> PageAction {
    let size = page_size.max(1) as u64;
    let last = last_page(count, page_size);

    if items_on_page == 0 {
        if current_page > 1 && last < current_page {
            return PageAction::StepBack;
        }
        // Only page left (or first page turned up empty): stay put and show
        // the empty state off a fresh fetch.
        return PageAction::RefreshOnly;
    }

    if count % size == 0 && last == 1 && current_page == 1 {
        // The collection just shrank back to exactly one full page; a
        // re-fetch drops the phantom trailing page.
        return PageAction::RefreshOnly;
    }

    PageAction::Stay
}
