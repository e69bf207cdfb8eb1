use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Indexer, Pagination, SearchQuery, SearchResult, SortField, SortOrder};
use crate::{error::Result, item::Item};

/// In-process index. Lost on restart; rebuilt from the store at startup.
#[derive(Debug, Default)]
pub struct MemoryIndexer {
    items: RwLock<HashMap<String, Item>>,
}

impl MemoryIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl Indexer for MemoryIndexer {
    async fn index(&self, item: &Item) -> Result<()> {
        self.items
            .write()
            .await
            .insert(item.hash.clone(), item.clone());
        Ok(())
    }

    async fn search(&self, query: &SearchQuery, page: Pagination) -> Result<SearchResult> {
        let mut hits: Vec<Item> = {
            let items = self.items.read().await;
            items.values().filter(|item| query.matches(item)).cloned().collect()
        };

        hits.sort_by(|a, b| {
            let ord = match query.sort {
                SortField::Created => a.created.cmp(&b.created),
                SortField::Added => a.added.cmp(&b.added),
                SortField::Name => a.name.cmp(&b.name),
            }
            .then_with(|| a.hash.cmp(&b.hash));
            match query.order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });

        let count = hits.len();
        let results = hits.into_iter().skip(page.from).take(page.size).collect();
        Ok(SearchResult {
            count,
            page,
            next: page.next(count),
            results,
        })
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        let items = self.items.read().await;
        let tags: BTreeSet<&String> = items
            .values()
            .filter(|item| !item.is_deleted())
            .flat_map(|item| item.tags.iter())
            .collect();
        Ok(tags.into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::item::ItemType;

    fn photo(hash: &str, day: u32, tags: &[&str]) -> Item {
        Item {
            item_type: ItemType::Photo,
            hash: hash.into(),
            name: format!("{hash}.jpg"),
            created: Utc.with_ymd_and_hms(2016, 1, day, 0, 0, 0).unwrap(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Item::default()
        }
    }

    #[tokio::test]
    async fn reindexing_replaces_by_hash() {
        let index = MemoryIndexer::new();
        let mut item = photo("a", 1, &[]);
        index.index(&item).await.unwrap();
        item.description = "updated".into();
        index.index(&item).await.unwrap();

        assert_eq!(index.len().await, 1);
        let found = index.search(&SearchQuery::new(), Pagination::default()).await.unwrap();
        assert_eq!(found.results[0].description, "updated");
    }

    #[tokio::test]
    async fn pages_newest_first_by_default() {
        let index = MemoryIndexer::new();
        for day in 1..=5 {
            index.index(&photo(&format!("h{day}"), day, &[])).await.unwrap();
        }

        let first = index
            .search(&SearchQuery::new(), Pagination::new(0, 2))
            .await
            .unwrap();
        assert_eq!(first.count, 5);
        let hashes: Vec<_> = first.results.iter().map(|i| i.hash.as_str()).collect();
        assert_eq!(hashes, ["h5", "h4"]);
        assert_eq!(first.next, Some(Pagination::new(2, 2)));

        let last = index
            .search(&SearchQuery::new(), Pagination::new(4, 2))
            .await
            .unwrap();
        assert_eq!(last.results.len(), 1);
        assert_eq!(last.next, None);
    }

    #[tokio::test]
    async fn lists_tags_of_visible_items() {
        let index = MemoryIndexer::new();
        index.index(&photo("a", 1, &["b", "a"])).await.unwrap();
        index.index(&photo("b", 2, &["a", "c"])).await.unwrap();
        let mut deleted = photo("c", 3, &["secret"]);
        deleted.deleted = Some(Utc::now());
        index.index(&deleted).await.unwrap();

        assert_eq!(index.list_tags().await.unwrap(), ["a", "b", "c"]);
    }
}
