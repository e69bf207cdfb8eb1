//! Search index abstraction.
//!
//! The store is the source of truth; an index is a rebuildable view over it.
//! [`reindex_store`] replays every stored item into an index, which is how a
//! store and an index that drifted apart get reconciled.

pub mod memory;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    error::{MediaError, Result},
    item::{Item, ItemType, LatLon},
    store::Store,
};

pub use memory::MemoryIndexer;

#[async_trait]
pub trait Indexer: Send + Sync + fmt::Debug {
    /// Add or replace the entry for `item.hash`.
    async fn index(&self, item: &Item) -> Result<()>;

    async fn search(&self, query: &SearchQuery, page: Pagination) -> Result<SearchResult>;

    /// Every distinct tag in use, sorted.
    async fn list_tags(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Created,
    Added,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Filters are ANDed together. An empty query matches every visible item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub types: Vec<ItemType>,
    /// Case-insensitive substring over name and description.
    pub text: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub near: Option<(LatLon, f64)>,
    /// Every listed tag must be present.
    pub tags: Vec<String>,
    pub sort: SortField,
    pub order: SortOrder,
    pub allow_deleted: bool,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit to one or more item types.
    pub fn types(mut self, types: impl IntoIterator<Item = ItemType>) -> Self {
        self.types.extend(types);
        self
    }

    pub fn matching(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Created within `[from, to]`; either bound may be open.
    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn near(mut self, position: LatLon, radius_km: f64) -> Self {
        self.near = Some((position, radius_km));
        self
    }

    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort = field;
        self.order = order;
        self
    }

    pub fn allow_deleted(mut self, allow: bool) -> Self {
        self.allow_deleted = allow;
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        if item.is_deleted() && !self.allow_deleted {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&item.item_type) {
            return false;
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            if !item.name.to_lowercase().contains(&needle)
                && !item.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.created_from.is_some_and(|from| item.created < from)
            || self.created_to.is_some_and(|to| item.created > to)
        {
            return false;
        }
        if let Some((center, radius_km)) = &self.near {
            match item.location {
                Some(loc) if item.has_location() => {
                    if loc.distance_km(center) > *radius_km {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        self.tags.iter().all(|tag| item.has_tag(tag))
    }
}

/// Offset and limit of one result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pagination {
    pub from: usize,
    pub size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { from: 0, size: 20 }
    }
}

impl Pagination {
    pub fn new(from: usize, size: usize) -> Self {
        Self { from, size }
    }

    /// The page after this one, if `total` leaves anything for it.
    pub fn next(&self, total: usize) -> Option<Pagination> {
        let end = self.from.saturating_add(self.size);
        (self.size > 0 && end < total).then_some(Pagination {
            from: end,
            size: self.size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResult {
    /// Total matches across all pages.
    pub count: usize,
    pub page: Pagination,
    /// `None` on the last page.
    pub next: Option<Pagination>,
    pub results: Vec<Item>,
}

/// Feed every stored item into `indexer`.
///
/// Decode failures from the store walk and index failures are both reported
/// on the returned channel; neither stops the pass. The channel closes once
/// the walk is done.
pub fn reindex_store(
    store: Arc<dyn Store>,
    indexer: Arc<dyn Indexer>,
) -> mpsc::Receiver<MediaError> {
    let (err_tx, err_rx) = mpsc::channel(16);
    let mut items = store.iterate();

    tokio::spawn(async move {
        let mut indexed = 0usize;
        while let Some(next) = items.recv().await {
            let outcome = match next {
                Ok(item) => indexer.index(&item).await.map(|()| indexed += 1),
                Err(err) => Err(err),
            };
            if let Err(err) = outcome
                && err_tx.send(err).await.is_err()
            {
                break;
            }
        }
        debug!(indexed, "reindex from store finished");
    });

    err_rx
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn item(name: &str, tags: &[&str]) -> Item {
        Item {
            item_type: ItemType::Photo,
            name: name.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Item::default()
        }
    }

    #[test]
    fn empty_query_hides_deleted_items() {
        let mut gone = item("a.jpg", &[]);
        gone.deleted = Some(Utc::now());

        assert!(SearchQuery::new().matches(&item("b.jpg", &[])));
        assert!(!SearchQuery::new().matches(&gone));
        assert!(SearchQuery::new().allow_deleted(true).matches(&gone));
    }

    #[test]
    fn tags_are_anded() {
        let query = SearchQuery::new().tagged(["people/chris", "events/wedding"]);
        assert!(query.matches(&item("x", &["events/wedding", "people/chris", "misc"])));
        assert!(!query.matches(&item("x", &["people/chris"])));
    }

    #[test]
    fn text_matches_name_or_description() {
        let mut described = item("IMG_0001.JPG", &[]);
        described.description = "Sunset over the bay".into();

        assert!(SearchQuery::new().matching("img_0001").matches(&described));
        assert!(SearchQuery::new().matching("SUNSET").matches(&described));
        assert!(!SearchQuery::new().matching("sunrise").matches(&described));
    }

    #[test]
    fn near_requires_a_location_within_radius() {
        let london = LatLon::new(51.5074, -0.1278);
        let mut in_town = item("a", &[]);
        in_town.location = Some(LatLon::new(51.5155, -0.0922));
        let mut paris = item("b", &[]);
        paris.location = Some(LatLon::new(48.8566, 2.3522));

        let query = SearchQuery::new().near(london, 10.0);
        assert!(query.matches(&in_town));
        assert!(!query.matches(&paris));
        assert!(!query.matches(&item("c", &[])));
    }

    #[test]
    fn created_range_is_inclusive() {
        let at = Utc.with_ymd_and_hms(2015, 6, 1, 12, 0, 0).unwrap();
        let mut taken = item("a", &[]);
        taken.created = at;

        assert!(SearchQuery::new().created_between(Some(at), Some(at)).matches(&taken));
        assert!(!SearchQuery::new().created_between(Some(at + chrono::Duration::seconds(1)), None).matches(&taken));
    }

    #[test]
    fn next_page_stops_at_total() {
        assert_eq!(Pagination::new(0, 10).next(25), Some(Pagination::new(10, 10)));
        assert_eq!(Pagination::new(20, 10).next(25), None);
        assert_eq!(Pagination::new(0, 10).next(10), None);
        assert_eq!(Pagination::new(usize::MAX - 1, 10).next(usize::MAX), None);
    }
}
