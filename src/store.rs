//! Response store: optional durable key→response mapping.
//!
//! The core consults storage through this narrow interface and never assumes
//! a particular engine. Writes are at-least-once and asynchronous; a read may
//! miss a just-completed write, and callers tolerate that. The in-memory
//! implementation backs tests and single-process deployments.

use crate::types::{InputItem, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Sort order for [`ResponseStore::list_input_items`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOrder {
    /// Oldest first.
    Asc,
    /// Newest first (default).
    #[default]
    Desc,
}

impl ListOrder {
    /// Parses `asc`/`desc`.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "asc" => Ok(ListOrder::Asc),
            "desc" => Ok(ListOrder::Desc),
            other => Err(Error::invalid_input(format!("unknown order: {other}"))),
        }
    }
}

/// Cursor pagination over a stored response's input items.
#[derive(Debug, Clone, Default)]
pub struct ListInputItemsQuery {
    /// Page size, clamped to `[1, 100]` by validation.
    pub limit: usize,
    /// Sort order.
    pub order: ListOrder,
    /// Return items after this item id (exclusive).
    pub after: Option<String>,
    /// Return items before this item id (exclusive).
    pub before: Option<String>,
}

impl ListInputItemsQuery {
    /// Validates the limit range.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.limit) {
            return Err(Error::invalid_input("limit must be between 1 and 100"));
        }
        Ok(())
    }
}

/// One stored response document: the final record plus the ordered input
/// items it was produced from.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    /// The final response record.
    pub response: Response,
    /// The input items, in working-sequence order, each with a stable id.
    pub input_items: Vec<StoredInputItem>,
}

/// An input item with the stable id used for cursor pagination.
#[derive(Debug, Clone)]
pub struct StoredInputItem {
    /// Stable item id (`item_...`).
    pub id: String,
    /// The item itself.
    pub item: InputItem,
}

/// Durable key→response mapping consumed by the orchestrator.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Persists a response and its input items. At-least-once.
    async fn store(&self, response: &Response, input_items: &[InputItem]) -> Result<()>;

    /// Fetches a stored response.
    ///
    /// # Errors
    ///
    /// `not-found` when the id is unknown.
    async fn get(&self, response_id: &str) -> Result<StoredResponse>;

    /// Deletes a stored response; returns whether it existed.
    async fn delete(&self, response_id: &str) -> Result<bool>;

    /// Pages through a stored response's input items.
    async fn list_input_items(
        &self,
        response_id: &str,
        query: &ListInputItemsQuery,
    ) -> Result<Vec<StoredInputItem>>;
}

/// In-memory [`ResponseStore`] behind an async `RwLock`.
#[derive(Default)]
pub struct InMemoryResponseStore {
    responses: RwLock<HashMap<String, StoredResponse>>,
}

impl InMemoryResponseStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn store(&self, response: &Response, input_items: &[InputItem]) -> Result<()> {
        let stored = StoredResponse {
            response: response.clone(),
            input_items: input_items
                .iter()
                .map(|item| StoredInputItem {
                    id: crate::types::generate_id("item"),
                    item: item.clone(),
                })
                .collect(),
        };
        self.responses
            .write()
            .await
            .insert(response.id.clone(), stored);
        Ok(())
    }

    async fn get(&self, response_id: &str) -> Result<StoredResponse> {
        self.responses
            .read()
            .await
            .get(response_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("response {response_id}")))
    }

    async fn delete(&self, response_id: &str) -> Result<bool> {
        Ok(self.responses.write().await.remove(response_id).is_some())
    }

    async fn list_input_items(
        &self,
        response_id: &str,
        query: &ListInputItemsQuery,
    ) -> Result<Vec<StoredInputItem>> {
        query.validate()?;
        let stored = self.get(response_id).await?;

        let mut items = stored.input_items;
        if query.order == ListOrder::Desc {
            items.reverse();
        }

        if let Some(after) = &query.after {
            if let Some(pos) = items.iter().position(|item| &item.id == after) {
                items.drain(..=pos);
            }
        }
        if let Some(before) = &query.before {
            if let Some(pos) = items.iter().position(|item| &item.id == before) {
                items.truncate(pos);
            }
        }

        items.truncate(query.limit);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseRequest;

    fn sample() -> (Response, Vec<InputItem>) {
        let req = ResponseRequest::from_text("m1", "Hello");
        let mut response = Response::in_progress(&req);
        response.status = crate::types::ResponseStatus::Completed;
        let items = vec![
            InputItem::user("Hello"),
            InputItem::assistant("Hi"),
            InputItem::user("More"),
        ];
        (response, items)
    }

    #[tokio::test]
    async fn test_store_and_get_roundtrip() {
        let store = InMemoryResponseStore::new();
        let (response, items) = sample();
        store.store(&response, &items).await.unwrap();

        let stored = store.get(&response.id).await.unwrap();
        assert_eq!(stored.response.id, response.id);
        assert_eq!(stored.input_items.len(), 3);
        assert!(stored.input_items[0].id.starts_with("item_"));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryResponseStore::new();
        let result = store.get("resp_missing").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = InMemoryResponseStore::new();
        let (response, items) = sample();
        store.store(&response, &items).await.unwrap();

        assert!(store.delete(&response.id).await.unwrap());
        assert!(!store.delete(&response.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_input_items_asc_and_desc() {
        let store = InMemoryResponseStore::new();
        let (response, items) = sample();
        store.store(&response, &items).await.unwrap();

        let asc = store
            .list_input_items(
                &response.id,
                &ListInputItemsQuery {
                    limit: 10,
                    order: ListOrder::Asc,
                    after: None,
                    before: None,
                },
            )
            .await
            .unwrap();
        let desc = store
            .list_input_items(
                &response.id,
                &ListInputItemsQuery {
                    limit: 10,
                    order: ListOrder::Desc,
                    after: None,
                    before: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(asc.len(), 3);
        assert_eq!(desc.len(), 3);
        assert_eq!(asc[0].id, desc[2].id);
    }

    #[tokio::test]
    async fn test_list_input_items_cursors() {
        let store = InMemoryResponseStore::new();
        let (response, items) = sample();
        store.store(&response, &items).await.unwrap();

        let all = store
            .list_input_items(
                &response.id,
                &ListInputItemsQuery {
                    limit: 10,
                    order: ListOrder::Asc,
                    after: None,
                    before: None,
                },
            )
            .await
            .unwrap();

        let after_first = store
            .list_input_items(
                &response.id,
                &ListInputItemsQuery {
                    limit: 10,
                    order: ListOrder::Asc,
                    after: Some(all[0].id.clone()),
                    before: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(after_first.len(), 2);
        assert_eq!(after_first[0].id, all[1].id);

        let before_last = store
            .list_input_items(
                &response.id,
                &ListInputItemsQuery {
                    limit: 10,
                    order: ListOrder::Asc,
                    after: None,
                    before: Some(all[2].id.clone()),
                },
            )
            .await
            .unwrap();
        assert_eq!(before_last.len(), 2);
    }

    #[tokio::test]
    async fn test_list_input_items_limit_validation() {
        let store = InMemoryResponseStore::new();
        let (response, items) = sample();
        store.store(&response, &items).await.unwrap();

        let result = store
            .list_input_items(
                &response.id,
                &ListInputItemsQuery {
                    limit: 0,
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let result = store
            .list_input_items(
                &response.id,
                &ListInputItemsQuery {
                    limit: 101,
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_list_order_parse() {
        assert_eq!(ListOrder::parse("asc").unwrap(), ListOrder::Asc);
        assert_eq!(ListOrder::parse("desc").unwrap(), ListOrder::Desc);
        assert!(ListOrder::parse("sideways").is_err());
    }
}
