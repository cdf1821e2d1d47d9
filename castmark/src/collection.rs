use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::store::SupabaseTable;
use crate::Error;

/// A named group of bookmarks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Store-assigned id
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional blurb shown under the name
    #[serde(default)]
    pub description: Option<String>,
    /// User who created the collection
    pub created_by_id: String,
    /// Whether other users may see the collection
    pub is_public: bool,
    /// Whether other users may add to the collection
    pub is_collaborative: bool,
    /// Image URL shown on the collection card
    #[serde(default)]
    pub cover_image: Option<String>,
    /// When the collection was created
    pub created_at: DateTime<Utc>,
    /// When the collection last changed
    pub updated_at: DateTime<Utc>,
}

/// A collection ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct NewCollection {
    pub name: String,
    pub description: Option<String>,
    pub created_by_id: String,
    pub is_public: bool,
    pub is_collaborative: bool,
    pub cover_image: Option<String>,
}

impl NewCollection {
    /// A private, single-owner collection with no description
    pub fn new(created_by_id: impl Into<String>, name: impl Into<String>) -> Self {
        NewCollection {
            name: name.into(),
            description: None,
            created_by_id: created_by_id.into(),
            is_public: false,
            is_collaborative: false,
            cover_image: None,
        }
    }
}

/// Changes to a collection; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct CollectionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_collaborative: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

impl CollectionUpdate {
    fn apply(self, collection: &mut Collection, updated_at: DateTime<Utc>) {
        if let Some(name) = self.name {
            collection.name = name;
        }
        if let Some(description) = self.description {
            collection.description = Some(description);
        }
        if let Some(is_public) = self.is_public {
            collection.is_public = is_public;
        }
        if let Some(is_collaborative) = self.is_collaborative {
            collection.is_collaborative = is_collaborative;
        }
        if let Some(cover_image) = self.cover_image {
            collection.cover_image = Some(cover_image);
        }
        collection.updated_at = updated_at;
    }
}

/// A bookmark's place in a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    /// Store-assigned id
    pub id: String,
    /// Collection the item belongs to
    pub collection_id: String,
    /// Bookmark the item points at
    pub bookmark_id: String,
    /// User who added the bookmark
    pub added_by_id: String,
    /// Position in the collection, ascending
    #[serde(default)]
    pub order: Option<i64>,
    /// When the bookmark was added
    pub added_at: DateTime<Utc>,
}

/// Position after the last item, or `0` for an empty collection
///
/// Items without a position count as position `0`.
fn next_order(orders: impl IntoIterator<Item = Option<i64>>) -> i64 {
    orders
        .into_iter()
        .map(|order| order.unwrap_or(0))
        .max()
        .map_or(0, |last| last + 1)
}

/// Persistence for collections and their items
pub trait CollectionStore {
    /// Lists the collections a user created, newest first
    fn list(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Collection>, Error>> + Send;

    /// Stores a new collection
    fn create(
        &self,
        collection: NewCollection,
    ) -> impl Future<Output = Result<Collection, Error>> + Send;

    /// Applies `changes` and bumps `updated_at`; `None` when no collection has the id
    fn update(
        &self,
        id: &str,
        changes: CollectionUpdate,
    ) -> impl Future<Output = Result<Option<Collection>, Error>> + Send;

    /// Deletes a collection and its items, returning whether it existed
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Items of a collection in position order
    fn items(
        &self,
        collection_id: &str,
    ) -> impl Future<Output = Result<Vec<CollectionItem>, Error>> + Send;

    /// Appends a bookmark to the end of a collection
    fn add_item(
        &self,
        collection_id: &str,
        bookmark_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<CollectionItem, Error>> + Send;

    /// Removes an item by id, returning whether it existed
    fn remove_item(&self, item_id: &str) -> impl Future<Output = Result<bool, Error>> + Send;
}

/// In-process collection store
#[derive(Debug, Default)]
pub struct MemoryCollectionStore {
    collections: DashMap<String, (u64, Collection)>,
    items: DashMap<String, (u64, CollectionItem)>,
    sequence: AtomicU64,
}

impl MemoryCollectionStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl CollectionStore for MemoryCollectionStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Collection>, Error> {
        let mut collections: Vec<(u64, Collection)> = self
            .collections
            .iter()
            .filter(|entry| entry.1.created_by_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();

        collections.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at.cmp(&a.created_at).then(b_seq.cmp(a_seq))
        });

        Ok(collections.into_iter().map(|(_, collection)| collection).collect())
    }

    async fn create(&self, collection: NewCollection) -> Result<Collection, Error> {
        let seq = self.next_seq();
        let now = Utc::now();
        let created = Collection {
            id: format!("col_{}", seq),
            name: collection.name,
            description: collection.description,
            created_by_id: collection.created_by_id,
            is_public: collection.is_public,
            is_collaborative: collection.is_collaborative,
            cover_image: collection.cover_image,
            created_at: now,
            updated_at: now,
        };

        self.collections
            .insert(created.id.clone(), (seq, created.clone()));
        Ok(created)
    }

    async fn update(&self, id: &str, changes: CollectionUpdate) -> Result<Option<Collection>, Error> {
        Ok(self.collections.get_mut(id).map(|mut entry| {
            changes.apply(&mut entry.1, Utc::now());
            entry.1.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, Error> {
        if self.collections.remove(id).is_none() {
            return Ok(false);
        }

        self.items.retain(|_, (_, item)| item.collection_id != id);
        Ok(true)
    }

    async fn items(&self, collection_id: &str) -> Result<Vec<CollectionItem>, Error> {
        let mut items: Vec<(u64, CollectionItem)> = self
            .items
            .iter()
            .filter(|entry| entry.1.collection_id == collection_id)
            .map(|entry| entry.value().clone())
            .collect();

        // unpositioned items go last, as Postgres sorts nulls
        items.sort_by_key(|(seq, item)| (item.order.is_none(), item.order, *seq));

        Ok(items.into_iter().map(|(_, item)| item).collect())
    }

    async fn add_item(
        &self,
        collection_id: &str,
        bookmark_id: &str,
        user_id: &str,
    ) -> Result<CollectionItem, Error> {
        if !self.collections.contains_key(collection_id) {
            return Err(Error::StoreError(format!(
                "No collection with id {}",
                collection_id
            )));
        }

        let order = next_order(
            self.items
                .iter()
                .filter(|entry| entry.1.collection_id == collection_id)
                .map(|entry| entry.1.order),
        );

        let seq = self.next_seq();
        let item = CollectionItem {
            id: format!("item_{}", seq),
            collection_id: collection_id.to_string(),
            bookmark_id: bookmark_id.to_string(),
            added_by_id: user_id.to_string(),
            order: Some(order),
            added_at: Utc::now(),
        };

        self.items.insert(item.id.clone(), (seq, item.clone()));
        Ok(item)
    }

    async fn remove_item(&self, item_id: &str) -> Result<bool, Error> {
        Ok(self.items.remove(item_id).is_some())
    }
}

/// Collection store backed by the `collections` and `collection_items` tables
#[derive(Debug, Clone)]
pub struct SupabaseCollectionStore {
    collections: SupabaseTable,
    items: SupabaseTable,
}

#[derive(Debug, Serialize)]
struct CollectionPatch {
    #[serde(flatten)]
    changes: CollectionUpdate,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct CollectionRow<'a> {
    #[serde(flatten)]
    collection: &'a NewCollection,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct NewItem<'a> {
    collection_id: &'a str,
    bookmark_id: &'a str,
    added_by_id: &'a str,
    order: i64,
}

#[derive(Debug, Deserialize)]
struct OrderRow {
    order: Option<i64>,
}

impl SupabaseCollectionStore {
    /// Creates a store for the project at `project_url`
    pub fn new(project_url: &str, api_key: impl Into<String>) -> Result<Self, Error> {
        let api_key = api_key.into();
        Ok(SupabaseCollectionStore {
            collections: SupabaseTable::new(project_url, "collections", api_key.clone())?,
            items: SupabaseTable::new(project_url, "collection_items", api_key)?,
        })
    }
}

impl CollectionStore for SupabaseCollectionStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Collection>, Error> {
        let request = self.collections.request(reqwest::Method::GET).query(&[
            ("select", "*".to_string()),
            ("created_by_id", format!("eq.{}", user_id)),
            ("order", "created_at.desc".to_string()),
        ]);

        self.collections.rows(request, "collection list").await
    }

    #[instrument(skip(self, collection), fields(user_id = %collection.created_by_id))]
    async fn create(&self, collection: NewCollection) -> Result<Collection, Error> {
        let request = self
            .collections
            .request(reqwest::Method::POST)
            .header("Prefer", "return=representation")
            .json(&CollectionRow {
                collection: &collection,
                updated_at: Utc::now(),
            });

        let created: Collection = self
            .collections
            .rows(request, "collection insert")
            .await?
            .pop()
            .ok_or_else(|| Error::StoreError("Collection insert returned no row".to_string()))?;

        info!(id = %created.id, "Collection created");
        Ok(created)
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, id: &str, changes: CollectionUpdate) -> Result<Option<Collection>, Error> {
        let request = self
            .collections
            .request(reqwest::Method::PATCH)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&CollectionPatch {
                changes,
                updated_at: Utc::now(),
            });

        Ok(self.collections.rows(request, "collection update").await?.pop())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<bool, Error> {
        let items = self
            .items
            .request(reqwest::Method::DELETE)
            .query(&[("collection_id", format!("eq.{}", id))])
            .header("Prefer", "return=representation");
        self.items
            .rows::<CollectionItem>(items, "collection item delete")
            .await?;

        let request = self
            .collections
            .request(reqwest::Method::DELETE)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation");

        Ok(!self
            .collections
            .rows::<Collection>(request, "collection delete")
            .await?
            .is_empty())
    }

    async fn items(&self, collection_id: &str) -> Result<Vec<CollectionItem>, Error> {
        let request = self.items.request(reqwest::Method::GET).query(&[
            ("select", "*".to_string()),
            ("collection_id", format!("eq.{}", collection_id)),
            ("order", "order.asc".to_string()),
        ]);

        self.items.rows(request, "collection items").await
    }

    #[instrument(skip(self))]
    async fn add_item(
        &self,
        collection_id: &str,
        bookmark_id: &str,
        user_id: &str,
    ) -> Result<CollectionItem, Error> {
        let last = self.items.request(reqwest::Method::GET).query(&[
            ("select", "order".to_string()),
            ("collection_id", format!("eq.{}", collection_id)),
            ("order", "order.desc.nullslast".to_string()),
            ("limit", "1".to_string()),
        ]);
        let last: Vec<OrderRow> = self.items.rows(last, "collection item order").await?;

        let request = self
            .items
            .request(reqwest::Method::POST)
            .header("Prefer", "return=representation")
            .json(&NewItem {
                collection_id,
                bookmark_id,
                added_by_id: user_id,
                order: next_order(last.into_iter().map(|row| row.order)),
            });

        let item: CollectionItem = self
            .items
            .rows(request, "collection item insert")
            .await?
            .pop()
            .ok_or_else(|| Error::StoreError("Collection item insert returned no row".to_string()))?;

        info!(id = %item.id, order = ?item.order, "Bookmark added to collection");
        Ok(item)
    }

    async fn remove_item(&self, item_id: &str) -> Result<bool, Error> {
        let request = self
            .items
            .request(reqwest::Method::DELETE)
            .query(&[("id", format!("eq.{}", item_id))])
            .header("Prefer", "return=representation");

        Ok(!self
            .items
            .rows::<CollectionItem>(request, "collection item delete")
            .await?
            .is_empty())
    }
}
