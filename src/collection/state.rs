//! The in-memory record sequence behind a collection view.

use crate::structs::SightingRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PagingMode {
    /// One page is visible at a time.
    #[default]
    Paginated,
    /// Pages accumulate; older ones are appended at the tail.
    InfiniteScroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Replace,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Replaced { index: usize },
    Inserted,
    /// The record is new but the first page is not visible; navigate to page 1 to see it.
    Deferred,
}

/// Ordered newest first. Identifiers are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState {
    records: Vec<SightingRecord>,
    page: u32,
    per_page: u32,
    total_items: Option<u64>,
    mode: PagingMode,
}

impl CollectionState {
    #[must_use]
    pub fn new(per_page: u32, mode: PagingMode) -> Self {
        Self {
            records: Vec::new(),
            page: 1,
            per_page: per_page.max(1),
            total_items: None,
            mode,
        }
    }

    #[must_use]
    pub fn records(&self) -> &[SightingRecord] {
        &self.records
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    #[must_use]
    pub fn mode(&self) -> PagingMode {
        self.mode
    }

    /// Authoritative total from the last list or count query.
    #[must_use]
    pub fn total_items(&self) -> Option<u64> {
        self.total_items
    }

    /// `1` until the first authoritative total is known.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        self.total_items
            .map_or(1, |total| total.div_ceil(u64::from(self.per_page)))
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        match (self.mode, self.total_items) {
            (_, None) => true,
            (PagingMode::Paginated, Some(_)) => u64::from(self.page) < self.total_pages(),
            (PagingMode::InfiniteScroll, Some(total)) => (self.records.len() as u64) < total,
        }
    }

    /// The page `load_more` should fetch.
    ///
    /// In infinite-scroll mode the visible records mirror a prefix of the server's list,
    /// so local inserts and removals shift where that prefix ends. The page holding the
    /// first unseen row is fetched again if needed; `apply_page` drops the overlap.
    #[must_use]
    pub fn next_page(&self) -> u32 {
        match self.mode {
            PagingMode::Paginated => self.page + 1,
            PagingMode::InfiniteScroll => {
                let consumed = u32::try_from(self.records.len()).unwrap_or(u32::MAX);
                consumed / self.per_page + 1
            }
        }
    }

    #[must_use]
    pub fn is_first_page_visible(&self) -> bool {
        self.mode == PagingMode::InfiniteScroll || self.page == 1
    }

    pub fn apply_page(&mut self, page: u32, items: Vec<SightingRecord>, total_items: u64, mode: LoadMode) {
        if mode == LoadMode::Replace {
            self.records.clear();
        }
        for item in items {
            // A record inserted locally may also arrive with the next page.
            if !self.records.iter().any(|r| r.id == item.id) {
                self.records.push(item);
            }
        }
        self.page = page;
        self.total_items = Some(total_items);
    }

    /// Replaces a known record in place, otherwise counts it as a new server row.
    pub fn upsert(&mut self, record: SightingRecord) -> UpsertOutcome {
        if let Some(index) = self.records.iter().position(|r| r.id == record.id) {
            self.records[index] = record;
            return UpsertOutcome::Replaced { index };
        }
        self.total_items = self.total_items.map(|total| total + 1);
        if self.is_first_page_visible() {
            self.records.insert(0, record);
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Deferred
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        let removed = self.records.len() != before;
        if removed {
            self.total_items = self.total_items.map(|total| total.saturating_sub(1));
        }
        removed
    }

    pub fn set_total_items(&mut self, total_items: u64) {
        self.total_items = Some(total_items);
    }

    pub fn set_mode(&mut self, mode: PagingMode) {
        self.mode = mode;
    }

    /// Drops every record, e.g. after sign-out.
    pub fn clear(&mut self) {
        self.records.clear();
        self.page = 1;
        self.total_items = None;
    }
}
