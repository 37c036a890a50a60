//! Pagination engine
//!
//! Both adapters page through [`paginate_source`], and in-memory collections
//! page through [`paginate`]. The two paths share [`Pagination::assemble`], so
//! the same items, count and request always produce the same page.
//!
//! A request with `page <= 0` or `page_size <= 0` is unbounded: every
//! matching item lands on a single page whose size is the total count.
//!
//! ## Example
//!
//! ```rust
//! use unit_of_work::pagination::{paginate, PageRequest};
//!
//! let letters = vec!["a", "b", "c"];
//! let page = paginate(letters, None::<fn(&&str) -> bool>, PageRequest::new(2, 2));
//!
//! assert_eq!(page.items, vec!["c"]);
//! assert_eq!(page.total_items, 3);
//! assert_eq!(page.total_pages, 2);
//! assert!(!page.has_next);
//! assert!(page.has_previous);
//! ```

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::repository::{Predicate, RepositoryResult};

/// Default page size when none is configured
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// A 1-indexed page request
///
/// Values are signed on purpose: zero or negative values request the whole
/// filtered set as one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1
    pub page: i64,
    /// Maximum items per page
    pub page_size: i64,
}

impl PageRequest {
    /// Create a page request
    #[must_use]
    pub const fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// A request for every matching item on one page
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            page: 0,
            page_size: 0,
        }
    }

    /// Whether this request disables slicing
    pub const fn is_unbounded(&self) -> bool {
        self.page <= 0 || self.page_size <= 0
    }

    /// The slice to fetch, or `None` when unbounded
    ///
    /// ```rust
    /// use unit_of_work::pagination::{PageRequest, Window};
    ///
    /// assert_eq!(PageRequest::new(3, 20).window(), Some(Window { offset: 40, limit: 20 }));
    /// assert_eq!(PageRequest::new(0, 20).window(), None);
    /// ```
    pub fn window(&self) -> Option<Window> {
        if self.is_unbounded() {
            return None;
        }
        // both positive here
        let page = self.page as u64;
        let page_size = self.page_size as u64;
        Some(Window {
            offset: (page - 1).saturating_mul(page_size),
            limit: page_size,
        })
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Offset/limit slice of a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

/// One page of results plus the totals needed to navigate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Number of items matching the predicate across all pages
    pub total_items: u64,
    /// Number of pages
    pub total_pages: u64,
    /// This page's number
    pub page: i64,
    /// Page size used to slice
    pub page_size: i64,
    /// Whether a later page exists
    pub has_next: bool,
    /// Whether an earlier page exists
    pub has_previous: bool,
}

impl<T> Pagination<T> {
    /// Build a page from the fetched items and the separately counted total
    pub fn assemble(items: Vec<T>, total_items: u64, request: PageRequest) -> Self {
        let (page, page_size) = if request.is_unbounded() {
            (1, i64::try_from(total_items).unwrap_or(i64::MAX))
        } else {
            (request.page, request.page_size)
        };
        let total_pages = total_pages(total_items, page_size);
        let has_next = u64::try_from(page).is_ok_and(|p| p < total_pages);

        Self {
            items,
            total_items,
            total_pages,
            page,
            page_size,
            has_next,
            has_previous: page > 1,
        }
    }

    /// Transform the items while keeping the page metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Pagination<U> {
        Pagination {
            items: self.items.into_iter().map(f).collect(),
            total_items: self.total_items,
            total_pages: self.total_pages,
            page: self.page,
            page_size: self.page_size,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

/// `ceil(total_items / effective_page_size)`, where a non-positive page size
/// means everything fits on one page
pub fn total_pages(total_items: u64, page_size: i64) -> u64 {
    let effective = if page_size > 0 {
        page_size as u64
    } else {
        total_items
    };
    if effective == 0 {
        return 0;
    }
    (total_items as f64 / effective as f64).ceil() as u64
}

/// Page through an in-memory collection
pub fn paginate<T, I, P>(source: I, predicate: Option<P>, request: PageRequest) -> Pagination<T>
where
    I: IntoIterator<Item = T>,
    P: Fn(&T) -> bool,
{
    let matching: Vec<T> = match predicate {
        Some(p) => source.into_iter().filter(|item| p(item)).collect(),
        None => source.into_iter().collect(),
    };
    let total_items = matching.len() as u64;
    let items = match request.window() {
        Some(window) => matching
            .into_iter()
            .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
            .collect(),
        None => matching,
    };
    Pagination::assemble(items, total_items, request)
}

/// A store that can fetch a window of matching entities and count them
///
/// Implementors must apply the same predicate to both calls.
pub trait PageSource<T: Entity>: Send + Sync {
    /// Fetch the matching entities inside `window` (all of them when `None`)
    fn fetch_window(
        &self,
        predicate: Option<&Predicate<T>>,
        window: Option<Window>,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Count every matching entity
    fn count_matching(
        &self,
        predicate: Option<&Predicate<T>>,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;
}

/// Page through a store: one windowed fetch plus one count over the same predicate
pub async fn paginate_source<T, S>(
    source: &S,
    predicate: Option<&Predicate<T>>,
    request: PageRequest,
) -> RepositoryResult<Pagination<T>>
where
    T: Entity,
    S: PageSource<T> + ?Sized,
{
    let items = source.fetch_window(predicate, request.window()).await?;
    let total_items = source.count_matching(predicate).await?;
    tracing::debug!(
        entity = T::entity_name(),
        page = request.page,
        page_size = request.page_size,
        fetched = items.len(),
        total_items,
        "Fetched page"
    );
    Ok(Pagination::assemble(items, total_items, request))
}

impl<T: Entity + Clone> PageSource<T> for Vec<T> {
    async fn fetch_window(
        &self,
        predicate: Option<&Predicate<T>>,
        window: Option<Window>,
    ) -> RepositoryResult<Vec<T>> {
        let matching = self
            .iter()
            .filter(|item| predicate.map_or(true, |p| p.matches(item)))
            .cloned();
        Ok(match window {
            Some(window) => matching
                .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
                .collect(),
            None => matching.collect(),
        })
    }

    async fn count_matching(&self, predicate: Option<&Predicate<T>>) -> RepositoryResult<u64> {
        Ok(self
            .iter()
            .filter(|item| predicate.map_or(true, |p| p.matches(item)))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Customer, CustomerField};

    fn no_filter<T>() -> Option<fn(&T) -> bool> {
        None
    }

    #[test]
    fn test_page_request_window() {
        assert_eq!(
            PageRequest::new(1, 2).window(),
            Some(Window {
                offset: 0,
                limit: 2
            })
        );
        assert_eq!(
            PageRequest::new(2, 2).window(),
            Some(Window {
                offset: 2,
                limit: 2
            })
        );
        assert_eq!(PageRequest::new(-1, 2).window(), None);
        assert_eq!(PageRequest::new(1, 0).window(), None);
        assert_eq!(PageRequest::default(), PageRequest::new(1, 10));
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(3, 2), 2);
        assert_eq!(total_pages(4, 2), 2);
        assert_eq!(total_pages(5, 2), 3);
        assert_eq!(total_pages(7, 0), 1);
        assert_eq!(total_pages(7, -3), 1);
        assert_eq!(total_pages(0, -3), 0);
    }

    #[test]
    fn test_three_items_two_per_page() {
        let first = paginate(vec!['A', 'B', 'C'], no_filter(), PageRequest::new(1, 2));
        assert_eq!(first.items, vec!['A', 'B']);
        assert_eq!(first.total_items, 3);
        assert_eq!(first.total_pages, 2);
        assert!(first.has_next);
        assert!(!first.has_previous);

        let second = paginate(vec!['A', 'B', 'C'], no_filter(), PageRequest::new(2, 2));
        assert_eq!(second.items, vec!['C']);
        assert!(!second.has_next);
        assert!(second.has_previous);
    }

    #[test]
    fn test_single_item_pages() {
        let page = paginate(vec![1, 2], no_filter(), PageRequest::new(1, 1));
        assert_eq!(page.total_pages, 2);
        assert!(page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_unbounded_returns_everything() {
        for request in [
            PageRequest::new(0, 5),
            PageRequest::new(3, 0),
            PageRequest::new(-2, -2),
        ] {
            let page = paginate(1..=7, no_filter(), request);
            assert_eq!(page.items.len(), 7);
            assert_eq!(page.total_items, 7);
            assert_eq!(page.total_pages, 1);
            assert_eq!(page.page, 1);
            assert_eq!(page.page_size, 7);
            assert!(!page.has_next);
            assert!(!page.has_previous);
        }
    }

    #[test]
    fn test_unbounded_empty() {
        let page = paginate(Vec::<u8>::new(), no_filter(), PageRequest::unbounded());
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next);
    }

    #[test]
    fn test_page_past_the_end() {
        let page = paginate(1..=3, no_filter(), PageRequest::new(5, 2));
        assert!(page.items.is_empty());
        assert_eq!(page.total_items, 3);
        assert!(!page.has_next);
        assert!(page.has_previous);
    }

    #[test]
    fn test_predicate_applies_to_items_and_total() {
        let page = paginate(1..=10, Some(|n: &i32| n % 2 == 0), PageRequest::new(2, 2));
        assert_eq!(page.items, vec![6, 8]);
        assert_eq!(page.total_items, 5);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_item_count_law() {
        for n in 0..12_usize {
            for size in 1..5_i64 {
                let pages = total_pages(n as u64, size);
                for page in 1..=pages as i64 {
                    let result = paginate(0..n, no_filter(), PageRequest::new(page, size));
                    let expected = (size as usize).min(n - (page as usize - 1) * size as usize);
                    assert_eq!(result.items.len(), expected);
                    assert_eq!(result.has_next, page < pages as i64);
                    assert_eq!(result.has_previous, page > 1);
                }
            }
        }
    }

    #[test]
    fn test_map_keeps_metadata() {
        let page = paginate(1..=3, no_filter(), PageRequest::new(1, 2)).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn test_async_source_matches_sync_path() {
        let customers: Vec<Customer> = (1..=5)
            .map(|i| Customer::new(&format!("c-{}", i), "Ada", 20 + i))
            .collect();
        let predicate = Predicate::<Customer>::new().gt(CustomerField::Age, 21);

        for request in [
            PageRequest::new(1, 2),
            PageRequest::new(2, 2),
            PageRequest::new(0, 2),
        ] {
            let from_source = paginate_source(&customers, Some(&predicate), request)
                .await
                .unwrap();
            let in_memory = paginate(
                customers.clone(),
                Some(|c: &Customer| predicate.matches(c)),
                request,
            );
            assert_eq!(from_source, in_memory);
        }
    }
}
