use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use auth::Clock;
use auth::SystemClock;
use tokio::sync::RwLock;

use crate::domain::account::models::Account;
use crate::domain::account::ports::AccountRepository;
use crate::domain::repository::Entity;
use crate::domain::repository::Page;
use crate::domain::repository::Repository;
use crate::domain::repository::RepositoryError;
use crate::domain::repository::UniqueKey;

struct Store<T: Entity> {
    /// Rows keyed by insertion sequence, which gives creation order.
    rows: BTreeMap<u64, T>,
    ids: HashMap<T::Id, u64>,
    unique: HashMap<UniqueKey, T::Id>,
    next_sequence: u64,
}

impl<T: Entity> Store<T> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            ids: HashMap::new(),
            unique: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// First unique key of `entity` already held by a different entity.
    fn conflict(&self, entity: &T) -> Option<UniqueKey> {
        entity
            .unique_keys()
            .into_iter()
            .find(|key| matches!(self.unique.get(key), Some(holder) if holder != entity.id()))
    }

    fn index(&mut self, entity: &T) {
        for key in entity.unique_keys() {
            self.unique.insert(key, entity.id().clone());
        }
    }

    fn unindex(&mut self, entity: &T) {
        for key in entity.unique_keys() {
            self.unique.remove(&key);
        }
    }
}

/// Process-local [`Repository`] for any entity kind.
///
/// One lock guards rows and indexes together, so uniqueness checks and the
/// write they protect are a single atomic step.
pub struct InMemoryRepository<T: Entity> {
    store: RwLock<Store<T>>,
    clock: Arc<dyn Clock>,
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RwLock::new(Store::new()),
            clock,
        }
    }

    /// Entity currently holding the unique `value` for `field`.
    pub async fn find_by_unique(&self, field: &'static str, value: &str) -> Option<T> {
        let store = self.store.read().await;
        let id = store.unique.get(&UniqueKey::new(field, value))?;
        let sequence = store.ids.get(id)?;
        store.rows.get(sequence).cloned()
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn get(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store
            .ids
            .get(id)
            .and_then(|sequence| store.rows.get(sequence))
            .cloned())
    }

    async fn list(&self, page: Page) -> Result<Vec<T>, RepositoryError> {
        let page = Page::new(page.offset, page.limit);
        let store = self.store.read().await;

        let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);

        Ok(store.rows.values().skip(offset).take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.store.read().await.rows.len() as u64)
    }

    async fn create(&self, draft: T::Draft) -> Result<T, RepositoryError> {
        let entity = T::create(draft, self.clock.now());
        let mut store = self.store.write().await;

        if store.ids.contains_key(entity.id()) {
            return Err(RepositoryError::Conflict {
                field: "id",
                value: entity.id().to_string(),
            });
        }
        if let Some(key) = store.conflict(&entity) {
            return Err(key.into());
        }

        let sequence = store.next_sequence;
        store.next_sequence += 1;
        store.ids.insert(entity.id().clone(), sequence);
        store.index(&entity);
        store.rows.insert(sequence, entity.clone());

        Ok(entity)
    }

    async fn update(&self, id: &T::Id, patch: T::Patch) -> Result<T, RepositoryError> {
        let now = self.clock.now();
        let mut store = self.store.write().await;

        let sequence = *store
            .ids
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        let current = store
            .rows
            .get(&sequence)
            .cloned()
            .ok_or_else(|| RepositoryError::Storage(format!("dangling index for {}", id)))?;

        let mut updated = current.clone();
        updated.apply(patch, now);

        if let Some(key) = store.conflict(&updated) {
            return Err(key.into());
        }

        store.unindex(&current);
        store.index(&updated);
        store.rows.insert(sequence, updated.clone());

        Ok(updated)
    }

    async fn delete(&self, id: &T::Id) -> Result<bool, RepositoryError> {
        let mut store = self.store.write().await;

        let Some(sequence) = store.ids.remove(id) else {
            return Ok(false);
        };
        if let Some(entity) = store.rows.remove(&sequence) {
            store.unindex(&entity);
        }

        Ok(true)
    }
}

#[async_trait]
impl AccountRepository for InMemoryRepository<Account> {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, RepositoryError> {
        Ok(self.find_by_unique(Account::USERNAME_KEY, username).await)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError> {
        Ok(self.find_by_unique(Account::EMAIL_KEY, email).await)
    }
}
