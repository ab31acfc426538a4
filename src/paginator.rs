//! Page clamping and pagination-link computation for collection responses.
//!
//! Processors fetch one row beyond the requested page size; the engine trims
//! the overshoot and hands the raw count here, which is what makes "is there
//! a next page" decidable without a count query.

use crate::operation::Page;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug)]
pub struct PaginatorConfig {
    pub default_page_size: u64,
    pub maximum_page_size: u64,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        PaginatorConfig {
            default_page_size: 100,
            maximum_page_size: 500,
        }
    }
}

/// Normalized page request. Offset/limit and number/size inputs keep their
/// own representation so links come back in the form the client used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSpec {
    OffsetLimit { offset: u64, limit: u64 },
    NumberSize { number: u64, size: u64 },
}

impl PageSpec {
    pub fn offset_and_limit(&self) -> (u64, u64) {
        match *self {
            PageSpec::OffsetLimit { offset, limit } => (offset, limit),
            PageSpec::NumberSize { number, size } => ((number - 1) * size, size),
        }
    }

    pub fn to_page(&self) -> Page {
        match *self {
            PageSpec::OffsetLimit { offset, limit } => Page {
                offset: Some(offset),
                limit: Some(limit),
                ..Default::default()
            },
            PageSpec::NumberSize { number, size } => Page {
                number: Some(number),
                size: Some(size),
                ..Default::default()
            },
        }
    }
}

/// The row window a processor should fetch for a requested page: offset plus
/// page size + 1, so the trimmed overshoot reveals whether a next page exists.
pub fn fetch_window(page: &Page) -> (u64, u64) {
    let size = page.limit.or(page.size).unwrap_or(0).max(1);
    let offset = page
        .offset
        .unwrap_or_else(|| (page.number.unwrap_or(1).max(1) - 1) * size);
    (offset, size + 1)
}

/// Relation names for pagination links, in output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PageRel {
    First,
    Prev,
    Next,
    Last,
}

pub struct Paginator {
    page: PageSpec,
}

impl Paginator {
    /// Normalizes the requested page, applying the default size and clamping
    /// the requested size to the configured maximum.
    pub fn new(config: PaginatorConfig, requested: Option<&Page>) -> Self {
        let clamp = |n: u64| n.min(config.maximum_page_size).max(1);
        let page = match requested {
            Some(p) if p.number.is_some() || p.size.is_some() => PageSpec::NumberSize {
                number: p.number.unwrap_or(1).max(1),
                size: clamp(p.size.unwrap_or(config.default_page_size)),
            },
            Some(p) => PageSpec::OffsetLimit {
                offset: p.offset.unwrap_or(0),
                limit: clamp(p.limit.unwrap_or(config.default_page_size)),
            },
            None => PageSpec::OffsetLimit {
                offset: 0,
                limit: config.default_page_size,
            },
        };
        Paginator { page }
    }

    pub fn current(&self) -> PageSpec {
        self.page
    }

    /// Page size of the current page; results beyond it are overshoot.
    pub fn limit(&self) -> u64 {
        self.page.offset_and_limit().1
    }

    /// Computes which of first/prev/next/last apply. `raw_count` is the
    /// untrimmed record count from the processor's limit-plus-one fetch: a
    /// count above the page size proves a next page; at or below it the end
    /// was reached and the current page doubles as `last`.
    pub fn links_page_params(&self, raw_count: usize) -> BTreeMap<PageRel, PageSpec> {
        let mut out = BTreeMap::new();
        let count = raw_count as u64;
        match self.page {
            PageSpec::OffsetLimit { offset, limit } => {
                out.insert(PageRel::First, PageSpec::OffsetLimit { offset: 0, limit });
                if offset > 0 {
                    out.insert(
                        PageRel::Prev,
                        PageSpec::OffsetLimit {
                            offset: offset.saturating_sub(limit),
                            limit,
                        },
                    );
                }
                if count > limit {
                    out.insert(
                        PageRel::Next,
                        PageSpec::OffsetLimit {
                            offset: offset + limit,
                            limit,
                        },
                    );
                } else {
                    out.insert(PageRel::Last, PageSpec::OffsetLimit { offset, limit });
                }
            }
            PageSpec::NumberSize { number, size } => {
                out.insert(PageRel::First, PageSpec::NumberSize { number: 1, size });
                if number > 1 {
                    out.insert(
                        PageRel::Prev,
                        PageSpec::NumberSize {
                            number: number - 1,
                            size,
                        },
                    );
                }
                if count > size {
                    out.insert(
                        PageRel::Next,
                        PageSpec::NumberSize {
                            number: number + 1,
                            size,
                        },
                    );
                } else {
                    out.insert(PageRel::Last, PageSpec::NumberSize { number, size });
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(offset: u64, limit: u64) -> Page {
        Page {
            offset: Some(offset),
            limit: Some(limit),
            ..Default::default()
        }
    }

    #[test]
    fn first_page_of_seven_has_next_but_no_prev() {
        // 7 records, offset 0, limit 1: the limit+1 fetch returns 2 rows.
        let p = Paginator::new(PaginatorConfig::default(), Some(&page(0, 1)));
        let links = p.links_page_params(2);
        assert!(links.contains_key(&PageRel::Next));
        assert!(!links.contains_key(&PageRel::Prev));
        assert_eq!(
            links[&PageRel::Next],
            PageSpec::OffsetLimit { offset: 1, limit: 1 }
        );
    }

    #[test]
    fn last_page_of_seven_has_prev_but_no_next() {
        // 7 records, offset 6, limit 1: the limit+1 fetch returns only 1 row.
        let p = Paginator::new(PaginatorConfig::default(), Some(&page(6, 1)));
        let links = p.links_page_params(1);
        assert!(links.contains_key(&PageRel::Prev));
        assert!(!links.contains_key(&PageRel::Next));
        assert_eq!(
            links[&PageRel::Prev],
            PageSpec::OffsetLimit { offset: 5, limit: 1 }
        );
        assert_eq!(
            links[&PageRel::Last],
            PageSpec::OffsetLimit { offset: 6, limit: 1 }
        );
    }

    #[test]
    fn requested_size_is_clamped_to_maximum() {
        let cfg = PaginatorConfig {
            default_page_size: 10,
            maximum_page_size: 25,
        };
        let p = Paginator::new(cfg, Some(&page(0, 9999)));
        assert_eq!(p.current(), PageSpec::OffsetLimit { offset: 0, limit: 25 });
    }

    #[test]
    fn absent_page_uses_default_size() {
        let cfg = PaginatorConfig {
            default_page_size: 10,
            maximum_page_size: 25,
        };
        let p = Paginator::new(cfg, None);
        assert_eq!(p.current(), PageSpec::OffsetLimit { offset: 0, limit: 10 });
    }

    #[test]
    fn number_size_paging_mirrors_offset_rules() {
        let req = Page {
            number: Some(2),
            size: Some(5),
            ..Default::default()
        };
        let p = Paginator::new(PaginatorConfig::default(), Some(&req));
        assert_eq!(p.current().offset_and_limit(), (5, 5));
        let links = p.links_page_params(6);
        assert_eq!(links[&PageRel::Prev], PageSpec::NumberSize { number: 1, size: 5 });
        assert_eq!(links[&PageRel::Next], PageSpec::NumberSize { number: 3, size: 5 });
        let links = p.links_page_params(2);
        assert!(!links.contains_key(&PageRel::Next));
        assert_eq!(links[&PageRel::Last], PageSpec::NumberSize { number: 2, size: 5 });
    }

    #[test]
    fn fetch_window_adds_one_to_the_page_size() {
        assert_eq!(fetch_window(&page(6, 1)), (6, 2));
        let numbered = Page {
            number: Some(3),
            size: Some(10),
            ..Default::default()
        };
        assert_eq!(fetch_window(&numbered), (20, 11));
    }
}
