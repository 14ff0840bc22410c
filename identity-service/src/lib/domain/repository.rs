use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use thiserror::Error;

/// Value of a field that must be unique across all entities of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey {
    pub field: &'static str,
    pub value: String,
}

impl UniqueKey {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// A record kind that can be stored by a [`Repository`].
///
/// Entities describe themselves: how a draft becomes a record, how a patch
/// changes one, and which of their fields must be unique. Storage adapters
/// stay generic over all of that.
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Caller-supplied fields for a new record.
    type Draft: Send + 'static;

    /// Partial change; fields left unset are not touched.
    type Patch: Send + 'static;

    fn id(&self) -> &Self::Id;

    /// Build a record, assigning the identifier and server-managed fields.
    fn create(draft: Self::Draft, now: DateTime<Utc>) -> Self;

    /// Apply the fields present in `patch`.
    fn apply(&mut self, patch: Self::Patch, now: DateTime<Utc>);

    fn unique_keys(&self) -> Vec<UniqueKey>;
}

/// Generic persistence for one entity kind.
///
/// Absence is a value (`None`/`false`), never an error. Every mutation is
/// atomic for the row it touches.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync + 'static {
    /// Retrieve an entity by identifier.
    ///
    /// # Errors
    /// * `Storage` - Backend failure
    async fn get(&self, id: &T::Id) -> Result<Option<T>, RepositoryError>;

    /// Retrieve a page of entities in creation order.
    ///
    /// # Errors
    /// * `Storage` - Backend failure
    async fn list(&self, page: Page) -> Result<Vec<T>, RepositoryError>;

    /// Number of stored entities.
    ///
    /// # Errors
    /// * `Storage` - Backend failure
    async fn count(&self) -> Result<u64, RepositoryError>;

    /// Persist a new entity.
    ///
    /// # Errors
    /// * `Conflict` - A unique field is already taken
    /// * `Storage` - Backend failure
    async fn create(&self, draft: T::Draft) -> Result<T, RepositoryError>;

    /// Modify only the fields present in `patch`.
    ///
    /// # Errors
    /// * `NotFound` - No entity with this identifier
    /// * `Conflict` - The change would duplicate a unique field
    /// * `Storage` - Backend failure
    async fn update(&self, id: &T::Id, patch: T::Patch) -> Result<T, RepositoryError>;

    /// Remove an entity. Returns whether anything was removed.
    ///
    /// # Errors
    /// * `Storage` - Backend failure
    async fn delete(&self, id: &T::Id) -> Result<bool, RepositoryError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("{field} already exists: {value}")]
    Conflict { field: &'static str, value: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<UniqueKey> for RepositoryError {
    fn from(key: UniqueKey) -> Self {
        RepositoryError::Conflict {
            field: key.field,
            value: key.value,
        }
    }
}

/// Offset/limit window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub const MAX_LIMIT: u64 = 100;
    pub const DEFAULT_LIMIT: u64 = 20;

    /// `limit` is clamped to [`Page::MAX_LIMIT`].
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: limit.min(Self::MAX_LIMIT),
        }
    }

    /// Window for a 1-based page number. Page 0 is treated as page 1.
    pub fn from_number(page: u64, page_size: u64) -> Self {
        let limit = page_size.min(Self::MAX_LIMIT);
        let offset = page.saturating_sub(1).saturating_mul(limit);
        Self::new(offset, limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }
}

/// A field in a partial update: left alone, or set to a new value.
///
/// For nullable fields use `Patch<Option<T>>`, where `Set(None)` clears the
/// field. When deserializing, mark the field `#[serde(default)]`: an absent
/// key becomes `Keep` and an explicit `null` becomes `Set(None)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Keep,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    /// Overwrite `target` if a value is set.
    pub fn apply_to(self, target: &mut T) {
        if let Patch::Set(value) = self {
            *target = value;
        }
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Keep => Patch::Keep,
            Patch::Set(value) => Patch::Set(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Keep => Patch::Keep,
            Patch::Set(value) => Patch::Set(f(value)),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Patch<U>, E> {
        match self {
            Patch::Keep => Ok(Patch::Keep),
            Patch::Set(value) => f(value).map(Patch::Set),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Patch::Keep => None,
            Patch::Set(value) => Some(value),
        }
    }
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Set)
    }
}
