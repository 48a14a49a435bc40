use serde::{Deserialize, Serialize};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A normalized page request.
///
/// Pages are 1-based. Construction never fails: out-of-range input is pulled
/// back into range instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Builds a page request from raw caller input.
    ///
    /// - a missing or non-positive `page` becomes 1
    /// - a missing or non-positive `page_size` becomes [`DEFAULT_PAGE_SIZE`]
    /// - a `page_size` above [`MAX_PAGE_SIZE`] is clamped to it
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = match page {
            Some(p) if p >= 1 => u32::try_from(p).unwrap_or(u32::MAX),
            _ => 1,
        };
        let page_size = match page_size {
            Some(s) if s >= 1 => u32::try_from(s.min(i64::from(MAX_PAGE_SIZE))).unwrap_or(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };
        Self { page, page_size }
    }

    /// Returns the 1-based page number.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Returns the page size.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of records to skip before this page.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }

    /// Maximum number of records on this page.
    pub fn limit(&self) -> usize {
        self.page_size as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus the total number of matching records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    /// Slices an already-sorted collection into the requested page.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit())
            .collect();
        Self { items, total }
    }

    /// Returns an empty page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    /// Maps every item on the page, keeping the total.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let req = PageRequest::new(None, None);
        assert_eq!(req.page(), 1);
        assert_eq!(req.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn non_positive_values_fall_back() {
        let req = PageRequest::new(Some(0), Some(-5));
        assert_eq!(req.page(), 1);
        assert_eq!(req.page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn page_size_is_clamped() {
        let req = PageRequest::new(Some(2), Some(500));
        assert_eq!(req.page_size(), MAX_PAGE_SIZE);
        assert_eq!(req.offset(), 100);
    }

    #[test]
    fn slices_sorted_collection() {
        let all: Vec<u32> = (1..=45).collect();
        let page = Page::from_sorted(all, PageRequest::new(Some(3), Some(20)));
        assert_eq!(page.total, 45);
        assert_eq!(page.items, (41..=45).collect::<Vec<_>>());
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = Page::from_sorted(vec![1, 2, 3], PageRequest::new(Some(9), Some(10)));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }
}
