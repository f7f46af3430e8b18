use crate::BrowseError;

/// One control in a page selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerItem {
    First,
    Previous,
    Page { number: u32, current: bool },
    Ellipsis,
    Next,
    Last,
}

/// Current page within a page map. Pages are 1-based; an empty table still
/// has one (header-only) page to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    current: u32,
    page_count: u32,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            current: 1,
            page_count: 1,
        }
    }
}

impl PageCursor {
    pub fn new(page_count: usize) -> Self {
        let mut cursor = Self::default();
        cursor.set_page_count(page_count);
        cursor
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn set_page_count(&mut self, page_count: usize) {
        self.page_count = u32::try_from(page_count).unwrap_or(u32::MAX).max(1);
        self.current = self.current.clamp(1, self.page_count);
    }

    pub fn reset(&mut self) {
        self.current = 1;
    }

    pub fn select(&mut self, page: u32) -> Result<u32, BrowseError> {
        if page == 0 || page > self.page_count {
            return Err(BrowseError::InvalidPageNumber {
                page,
                page_count: self.page_count as usize,
            });
        }
        self.current = page;
        Ok(page)
    }

    pub fn first(&self) -> u32 {
        1
    }

    pub fn last(&self) -> u32 {
        self.page_count
    }

    pub fn next(&self) -> u32 {
        self.current.saturating_add(1).min(self.page_count)
    }

    pub fn previous(&self) -> u32 {
        self.current.saturating_sub(1).max(1)
    }

    /// Page selector: first/previous arrows, page 1, the current page with
    /// `neighbours` pages either side, the last page, next/last arrows. Gaps
    /// become a single ellipsis.
    pub fn pager_items(&self, neighbours: u32) -> Vec<PagerItem> {
        let current = self.current;
        let total = self.page_count;
        let low = current.saturating_sub(neighbours).max(1);
        let high = current.saturating_add(neighbours).min(total);

        let mut items = vec![PagerItem::First, PagerItem::Previous];

        if low > 1 {
            items.push(PagerItem::Page {
                number: 1,
                current: false,
            });
            if low > 2 {
                items.push(PagerItem::Ellipsis);
            }
        }

        for number in low..=high {
            items.push(PagerItem::Page {
                number,
                current: number == current,
            });
        }

        if high < total {
            if high < total - 1 {
                items.push(PagerItem::Ellipsis);
            }
            items.push(PagerItem::Page {
                number: total,
                current: false,
            });
        }

        items.push(PagerItem::Next);
        items.push(PagerItem::Last);
        items
    }
}
