use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::action::ActionPayload;
use crate::cast::Cast;
use crate::lookup::{lookup_cast, CastLookup, LookupPlan, MAX_LOOKUP_ATTEMPTS};
use crate::reference::{CastReference, Resolver, FULL_HASH_LEN};
use crate::store::{BookmarkStore, NewBookmark, SaveOutcome};
use crate::Error;

/// Result of a successful import
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    /// The reference resolved from the input
    pub reference: CastReference,
    /// The cast content that was fetched
    pub cast: Cast,
    /// The stored bookmark
    pub saved: SaveOutcome,
}

/// Resolves input, fetches the cast and stores it as a bookmark
#[derive(Debug)]
pub struct Importer<L, S> {
    resolver: Resolver,
    lookup: L,
    store: S,
    max_attempts: usize,
    min_delay: Duration,
}

impl<L, S> Importer<L, S>
where
    L: CastLookup + Sync,
    S: BookmarkStore + Sync,
{
    /// Creates an importer
    pub fn new(resolver: Resolver, lookup: L, store: S) -> Self {
        Importer {
            resolver,
            lookup,
            store,
            max_attempts: MAX_LOOKUP_ATTEMPTS,
            min_delay: Duration::from_millis(250),
        }
    }

    /// Limits lookups per import, clamped to `1..=MAX_LOOKUP_ATTEMPTS`
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the delay before a lookup is retried with the next strategy
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// The resolver used for input
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// The bookmark store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolves input and fetches the cast without saving anything
    #[instrument(skip(self))]
    pub async fn preview(&self, input: &str) -> Result<(CastReference, Cast), Error> {
        let reference = self.resolver.resolve_reference(input)?;

        if reference.is_shortened {
            warn!(
                canonical_id = %reference.canonical_id,
                "Resolved a shortened hash, the match may not be unique"
            );
        }

        let plan = LookupPlan::for_reference(&reference, self.resolver.domains())
            .with_max_attempts(self.max_attempts)
            .with_min_delay(self.min_delay);
        let cast = lookup_cast(&self.lookup, &plan).await?;

        Ok((reference, cast))
    }

    /// Imports a pasted cast URL or hash into the user's bookmarks
    #[instrument(skip(self))]
    pub async fn import(&self, user_id: &str, input: &str) -> Result<ImportOutcome, Error> {
        let (reference, cast) = self.preview(input).await?;
        let cast_hash = confirmed_hash(&reference, &cast)?;

        let cast_url = cast
            .url
            .clone()
            .or_else(|| reference.canonical_url.clone())
            .unwrap_or_else(|| self.resolver.domains().cast_url(&cast_hash));

        let saved = self
            .store
            .save(NewBookmark::from_cast(user_id, cast_hash, &cast, cast_url))
            .await?;

        info!(
            id = %saved.bookmark().id,
            cast_hash = %saved.bookmark().cast_hash,
            new = saved.is_new(),
            "Cast imported"
        );

        Ok(ImportOutcome {
            reference,
            cast,
            saved,
        })
    }

    /// Imports the cast an action payload refers to
    ///
    /// `user_id` overrides the id carried by the payload.
    pub async fn import_action(
        &self,
        payload: &ActionPayload,
        user_id: Option<&str>,
    ) -> Result<ImportOutcome, Error> {
        let hash = payload.cast_hash().ok_or(Error::MissingCastHash)?;
        let user_id = user_id
            .or(payload.user_id.as_deref())
            .filter(|user_id| !user_id.trim().is_empty())
            .ok_or(Error::MissingUserId)?;

        self.import(user_id, hash).await
    }
}

fn is_complete_hash(hash: &str) -> bool {
    (hash.len() == FULL_HASH_LEN || hash.len() == 42)
        && hash
            .strip_prefix("0x")
            .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Picks the hash a bookmark is stored under
///
/// Full references are stored under their own canonical id and the fetched
/// cast must be that cast. Shortened references are provisional: only the
/// full hash returned by the lookup is ever persisted for them.
fn confirmed_hash(reference: &CastReference, cast: &Cast) -> Result<String, Error> {
    if !reference.is_shortened {
        if is_complete_hash(&cast.hash) && !reference.matches_hash(&cast.hash) {
            warn!(
                canonical_id = %reference.canonical_id,
                found = %cast.hash,
                "Lookup returned a different cast than the reference"
            );
            return Err(Error::HashMismatch {
                expected: reference.canonical_id.clone(),
                found: cast.hash.clone(),
            });
        }
        return Ok(reference.canonical_id.clone());
    }

    if !is_complete_hash(&cast.hash) {
        return Err(Error::ProvisionalHash {
            hash: reference.canonical_id.clone(),
        });
    }

    let prefix = reference.canonical_id.to_ascii_lowercase();
    if !cast.hash.to_ascii_lowercase().starts_with(&prefix) {
        return Err(Error::HashMismatch {
            expected: reference.canonical_id.clone(),
            found: cast.hash.clone(),
        });
    }

    Ok(cast.hash.clone())
}
