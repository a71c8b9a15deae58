//! Page slicing for assembled result sequences.

/// Page size used when a request does not name one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Returns the elements at indices `[page * offset, page * offset + offset)`
/// that exist in `items`. A page past the end is empty.
pub fn paginate<T>(items: Vec<T>, page: usize, offset: usize) -> Vec<T> {
    let start = match page.checked_mul(offset) {
        Some(start) if start < items.len() => start,
        _ => return Vec::new(),
    };
    items.into_iter().skip(start).take(offset).collect()
}
