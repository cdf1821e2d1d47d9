use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::cast::Cast;
use crate::{check_status, http_client, Error};

/// A bookmark ready to be persisted
///
/// `cast_hash` must be a resolved canonical id, never raw user input. It is
/// stored in lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    /// Owner of the bookmark
    pub user_id: String,
    /// Canonical hash of the bookmarked cast
    pub cast_hash: String,
    /// Farcaster id of the cast author
    pub cast_author_fid: Option<u64>,
    /// Username of the cast author
    pub cast_author_username: Option<String>,
    /// Display name of the cast author
    pub cast_author_display_name: Option<String>,
    /// Avatar of the cast author
    pub cast_author_pfp_url: Option<String>,
    /// Text of the cast
    pub cast_text: Option<String>,
    /// Display URL of the cast
    pub cast_url: Option<String>,
    /// Free-form note from the owner
    pub note: Option<String>,
    /// Tags chosen by the owner
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether other users may see the bookmark
    pub is_public: bool,
}

impl NewBookmark {
    /// Builds a public, untagged bookmark from fetched cast content
    pub fn from_cast(
        user_id: impl Into<String>,
        cast_hash: impl Into<String>,
        cast: &Cast,
        cast_url: String,
    ) -> Self {
        let text = if cast.text.is_empty() {
            "Cast content".to_string()
        } else {
            cast.text.clone()
        };

        NewBookmark {
            user_id: user_id.into(),
            cast_hash: cast_hash.into().to_ascii_lowercase(),
            cast_author_fid: Some(cast.author.fid),
            cast_author_username: cast.author.username.clone(),
            cast_author_display_name: cast.author.display_name.clone(),
            cast_author_pfp_url: cast.author.avatar_url().map(str::to_string),
            cast_text: Some(text),
            cast_url: Some(cast_url),
            note: Some(String::new()),
            tags: Vec::new(),
            is_public: true,
        }
    }
}

/// A persisted bookmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Store-assigned id
    pub id: String,
    /// Owner of the bookmark
    pub user_id: String,
    /// Canonical hash of the bookmarked cast
    pub cast_hash: String,
    /// Farcaster id of the cast author
    #[serde(default)]
    pub cast_author_fid: Option<u64>,
    /// Username of the cast author
    #[serde(default)]
    pub cast_author_username: Option<String>,
    /// Display name of the cast author
    #[serde(default)]
    pub cast_author_display_name: Option<String>,
    /// Avatar of the cast author
    #[serde(default)]
    pub cast_author_pfp_url: Option<String>,
    /// Text of the cast
    #[serde(default)]
    pub cast_text: Option<String>,
    /// Display URL of the cast
    #[serde(default)]
    pub cast_url: Option<String>,
    /// Free-form note from the owner
    #[serde(default)]
    pub note: Option<String>,
    /// Tags chosen by the owner; the table allows null
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    /// Whether other users may see the bookmark
    pub is_public: bool,
    /// When the bookmark was created
    pub created_at: DateTime<Utc>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Bookmark {
    fn from_new(id: String, new: NewBookmark, created_at: DateTime<Utc>) -> Self {
        Bookmark {
            id,
            user_id: new.user_id,
            cast_hash: new.cast_hash,
            cast_author_fid: new.cast_author_fid,
            cast_author_username: new.cast_author_username,
            cast_author_display_name: new.cast_author_display_name,
            cast_author_pfp_url: new.cast_author_pfp_url,
            cast_text: new.cast_text,
            cast_url: new.cast_url,
            note: new.note,
            tags: new.tags,
            is_public: new.is_public,
            created_at,
        }
    }
}

/// Changes to the owner-editable fields of a bookmark
///
/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkUpdate {
    /// Replacement note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Replacement tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl BookmarkUpdate {
    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.note.is_none() && self.tags.is_none()
    }

    fn apply(self, bookmark: &mut Bookmark) {
        if let Some(note) = self.note {
            bookmark.note = Some(note);
        }
        if let Some(tags) = self.tags {
            bookmark.tags = tags;
        }
    }
}

/// Result of saving a bookmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new bookmark was stored
    Created(Bookmark),
    /// The user had already bookmarked this cast; the existing record is returned
    AlreadySaved(Bookmark),
}

impl SaveOutcome {
    /// The stored bookmark
    pub fn bookmark(&self) -> &Bookmark {
        match self {
            SaveOutcome::Created(bookmark) | SaveOutcome::AlreadySaved(bookmark) => bookmark,
        }
    }

    /// Whether the save created a new record
    pub fn is_new(&self) -> bool {
        matches!(self, SaveOutcome::Created(_))
    }
}

/// Persistence for bookmarks, keyed by `(user_id, cast_hash)`
pub trait BookmarkStore {
    /// Stores a bookmark unless the user already saved the cast
    fn save(
        &self,
        bookmark: NewBookmark,
    ) -> impl Future<Output = Result<SaveOutcome, Error>> + Send;

    /// Finds a user's bookmark of a cast, comparing hashes case-insensitively
    fn find(
        &self,
        user_id: &str,
        cast_hash: &str,
    ) -> impl Future<Output = Result<Option<Bookmark>, Error>> + Send;

    /// Lists a user's bookmarks, newest first
    fn list(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Bookmark>, Error>> + Send;

    /// Changes the note and tags of a bookmark, returning the updated record
    ///
    /// Yields `None` when no bookmark has the id.
    fn update(
        &self,
        id: &str,
        changes: BookmarkUpdate,
    ) -> impl Future<Output = Result<Option<Bookmark>, Error>> + Send;

    /// Deletes a bookmark by id, returning whether it existed
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool, Error>> + Send;
}

/// In-process bookmark store
#[derive(Debug, Default)]
pub struct MemoryBookmarkStore {
    bookmarks: DashMap<(String, String), (u64, Bookmark)>,
    sequence: AtomicU64,
}

impl MemoryBookmarkStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn key(user_id: &str, cast_hash: &str) -> (String, String) {
        (user_id.to_string(), cast_hash.to_ascii_lowercase())
    }
}

impl BookmarkStore for MemoryBookmarkStore {
    async fn save(&self, bookmark: NewBookmark) -> Result<SaveOutcome, Error> {
        match self
            .bookmarks
            .entry(Self::key(&bookmark.user_id, &bookmark.cast_hash))
        {
            Entry::Occupied(entry) => Ok(SaveOutcome::AlreadySaved(entry.get().1.clone())),
            Entry::Vacant(entry) => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                let stored =
                    Bookmark::from_new(format!("bm_{}", seq), bookmark, Utc::now());
                entry.insert((seq, stored.clone()));
                Ok(SaveOutcome::Created(stored))
            }
        }
    }

    async fn find(&self, user_id: &str, cast_hash: &str) -> Result<Option<Bookmark>, Error> {
        Ok(self
            .bookmarks
            .get(&Self::key(user_id, cast_hash))
            .map(|entry| entry.1.clone()))
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Bookmark>, Error> {
        let mut bookmarks: Vec<(u64, Bookmark)> = self
            .bookmarks
            .iter()
            .filter(|entry| entry.1.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();

        bookmarks.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at.cmp(&a.created_at).then(b_seq.cmp(a_seq))
        });

        Ok(bookmarks.into_iter().map(|(_, bookmark)| bookmark).collect())
    }

    async fn update(&self, id: &str, changes: BookmarkUpdate) -> Result<Option<Bookmark>, Error> {
        let mut entry = match self.bookmarks.iter_mut().find(|entry| entry.1.id == id) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        changes.apply(&mut entry.value_mut().1);
        Ok(Some(entry.1.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, Error> {
        let key = self
            .bookmarks
            .iter()
            .find(|entry| entry.1.id == id)
            .map(|entry| entry.key().clone());

        Ok(match key {
            Some(key) => self.bookmarks.remove(&key).is_some(),
            None => false,
        })
    }
}

/// One PostgREST table of a Supabase project
#[derive(Debug, Clone)]
pub(crate) struct SupabaseTable {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl SupabaseTable {
    pub(crate) fn new(
        project_url: &str,
        table: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, Error> {
        Ok(SupabaseTable {
            client: http_client()?,
            url: format!("{}/rest/v1/{}", project_url.trim_end_matches('/'), table),
            api_key: api_key.into(),
        })
    }

    pub(crate) fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.client
            .request(method, &self.url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Sends `request` and decodes the returned rows
    pub(crate) async fn rows<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        item: &str,
    ) -> Result<Vec<T>, Error> {
        let response = request.send().await.map_err(|err| Error::FetchError {
            inner: err,
            item: item.to_string(),
        })?;

        let body = check_status(response, item)
            .map_err(|err| match err {
                Error::NotFound { .. } | Error::StatusError { .. } => {
                    Error::StoreError(err.to_string())
                }
                err => err,
            })?
            .text()
            .await
            .map_err(|err| Error::FetchError {
                inner: err,
                item: item.to_string(),
            })?;

        Ok(serde_json::from_str(&body)?)
    }
}

/// Bookmark store backed by the `bookmarks` table of a Supabase project
#[derive(Debug, Clone)]
pub struct SupabaseBookmarkStore {
    table: SupabaseTable,
}

impl SupabaseBookmarkStore {
    /// Creates a store for the project at `project_url`
    pub fn new(
        project_url: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, Error> {
        Ok(SupabaseBookmarkStore {
            table: SupabaseTable::new(project_url, "bookmarks", api_key)?,
        })
    }
}

impl BookmarkStore for SupabaseBookmarkStore {
    #[instrument(skip(self, bookmark), fields(user_id = %bookmark.user_id, cast_hash = %bookmark.cast_hash))]
    async fn save(&self, mut bookmark: NewBookmark) -> Result<SaveOutcome, Error> {
        bookmark.cast_hash.make_ascii_lowercase();

        let request = self
            .table
            .request(reqwest::Method::POST)
            .query(&[("on_conflict", "user_id,cast_hash")])
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&bookmark);

        match self.table.rows::<Bookmark>(request, "bookmark insert").await?.pop() {
            Some(created) => {
                info!(id = %created.id, "Bookmark saved");
                Ok(SaveOutcome::Created(created))
            }
            None => self
                .find(&bookmark.user_id, &bookmark.cast_hash)
                .await?
                .map(SaveOutcome::AlreadySaved)
                .ok_or_else(|| {
                    Error::StoreError(format!(
                        "Insert of {} was ignored but no existing bookmark was found",
                        bookmark.cast_hash
                    ))
                }),
        }
    }

    async fn find(&self, user_id: &str, cast_hash: &str) -> Result<Option<Bookmark>, Error> {
        let request = self.table.request(reqwest::Method::GET).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("cast_hash", format!("ilike.{}", cast_hash)),
            ("limit", "1".to_string()),
        ]);

        Ok(self.table.rows(request, "bookmark lookup").await?.pop())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Bookmark>, Error> {
        let request = self.table.request(reqwest::Method::GET).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("order", "created_at.desc".to_string()),
        ]);

        self.table.rows(request, "bookmark list").await
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, id: &str, changes: BookmarkUpdate) -> Result<Option<Bookmark>, Error> {
        if changes.is_empty() {
            let request = self.table.request(reqwest::Method::GET).query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{}", id)),
            ]);
            return Ok(self.table.rows(request, "bookmark lookup").await?.pop());
        }

        let request = self
            .table
            .request(reqwest::Method::PATCH)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&changes);

        let updated = self.table.rows(request, "bookmark update").await?.pop();
        if updated.is_some() {
            info!("Bookmark updated");
        }
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<bool, Error> {
        let request = self
            .table
            .request(reqwest::Method::DELETE)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation");

        Ok(!self.table.rows::<Bookmark>(request, "bookmark delete").await?.is_empty())
    }
}
