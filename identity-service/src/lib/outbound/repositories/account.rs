use std::sync::Arc;

use async_trait::async_trait;
use auth::Clock;
use auth::SystemClock;
use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::domain::account::models::Account;
use crate::domain::account::models::AccountId;
use crate::domain::account::models::AccountPatch;
use crate::domain::account::models::EmailAddress;
use crate::domain::account::models::FullName;
use crate::domain::account::models::NewAccount;
use crate::domain::account::models::Username;
use crate::domain::account::ports::AccountRepository;
use crate::domain::repository::Entity;
use crate::domain::repository::Page;
use crate::domain::repository::Patch;
use crate::domain::repository::Repository;
use crate::domain::repository::RepositoryError;

const COLUMNS: &str =
    "id, username, email, full_name, password_hash, active, privileged, created_at, updated_at";

const USERNAME_CONSTRAINT: &str = "accounts_username_key";
const EMAIL_CONSTRAINT: &str = "accounts_email_key";

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    username: String,
    email: String,
    full_name: Option<String>,
    password_hash: String,
    active: bool,
    privileged: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = RepositoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| RepositoryError::Storage(format!("invalid stored account: {}", e));

        Ok(Account {
            id: AccountId(row.id),
            username: Username::new(row.username).map_err(|e| corrupt(e.to_string()))?,
            email: EmailAddress::new(row.email).map_err(|e| corrupt(e.to_string()))?,
            full_name: row
                .full_name
                .map(FullName::new)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?,
            password_hash: row.password_hash,
            active: row.active,
            privileged: row.privileged,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct PostgresAccountRepository {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE {} = $1",
            COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Account::try_from).transpose()
    }
}

fn storage_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(e.to_string())
}

/// Map unique violations to `Conflict`, naming the value that was written.
fn write_error(e: sqlx::Error, username: Option<&str>, email: Option<&str>) -> RepositoryError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some(USERNAME_CONSTRAINT) => {
                    return RepositoryError::Conflict {
                        field: Account::USERNAME_KEY,
                        value: username.unwrap_or_default().to_string(),
                    }
                }
                Some(EMAIL_CONSTRAINT) => {
                    return RepositoryError::Conflict {
                        field: Account::EMAIL_KEY,
                        value: email.unwrap_or_default().to_string(),
                    }
                }
                _ => {}
            }
        }
    }
    storage_error(e)
}

/// `UPDATE ... RETURNING` touching only the columns the patch sets.
fn update_query(
    id: &AccountId,
    patch: AccountPatch,
    now: DateTime<Utc>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE accounts SET updated_at = ");
    builder.push_bind(now);

    if let Patch::Set(username) = patch.username {
        builder.push(", username = ").push_bind(username.as_str().to_string());
    }
    if let Patch::Set(email) = patch.email {
        builder.push(", email = ").push_bind(email.as_str().to_string());
    }
    if let Patch::Set(full_name) = patch.full_name {
        builder
            .push(", full_name = ")
            .push_bind(full_name.map(|name| name.as_str().to_string()));
    }
    if let Patch::Set(password_hash) = patch.password_hash {
        builder.push(", password_hash = ").push_bind(password_hash);
    }
    if let Patch::Set(active) = patch.active {
        builder.push(", active = ").push_bind(active);
    }
    if let Patch::Set(privileged) = patch.privileged {
        builder.push(", privileged = ").push_bind(privileged);
    }

    builder.push(" WHERE id = ").push_bind(id.0);
    builder.push(" RETURNING ").push(COLUMNS);
    builder
}

#[async_trait]
impl Repository<Account> for PostgresAccountRepository {
    async fn get(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Account::try_from).transpose()
    }

    async fn list(&self, page: Page) -> Result<Vec<Account>, RepositoryError> {
        let page = Page::new(page.offset, page.limit);

        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts ORDER BY created_at, id LIMIT $1 OFFSET $2",
            COLUMNS
        ))
        .bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(page.offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn create(&self, draft: NewAccount) -> Result<Account, RepositoryError> {
        let account = Account::create(draft, self.clock.now());

        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, username, email, full_name, password_hash, active, privileged, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.id.0)
        .bind(account.username.as_str())
        .bind(account.email.as_str())
        .bind(account.full_name.as_ref().map(FullName::as_str))
        .bind(account.password_hash.as_str())
        .bind(account.active)
        .bind(account.privileged)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(
                e,
                Some(account.username.as_str()),
                Some(account.email.as_str()),
            )
        })?;

        Ok(account)
    }

    async fn update(&self, id: &AccountId, patch: AccountPatch) -> Result<Account, RepositoryError> {
        let username = patch.username.as_ref().into_option().map(|u| u.as_str().to_string());
        let email = patch.email.as_ref().into_option().map(|e| e.as_str().to_string());

        let mut builder = update_query(id, patch, self.clock.now());
        let row = builder
            .build_query_as::<AccountRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error(e, username.as_deref(), email.as_deref()))?;

        match row {
            Some(row) => Account::try_from(row),
            None => Err(RepositoryError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &AccountId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, RepositoryError> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError> {
        self.find_one("email", email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: Username::new(username.to_string()).unwrap(),
            email: EmailAddress::new(email.to_string()).unwrap(),
            full_name: Some(FullName::new("Test Account".to_string()).unwrap()),
            password_hash: "$argon2id$stub".to_string(),
            privileged: false,
        }
    }

    #[test]
    fn test_update_query_sets_only_patched_columns() {
        let patch = AccountPatch {
            full_name: Patch::Set(None),
            active: Patch::Set(false),
            ..Default::default()
        };

        let builder = update_query(&AccountId::new(), patch, Utc::now());

        assert_eq!(
            builder.sql(),
            format!(
                "UPDATE accounts SET updated_at = $1, full_name = $2, active = $3 \
                 WHERE id = $4 RETURNING {}",
                COLUMNS
            )
        );
    }

    #[test]
    fn test_empty_update_query_only_touches_timestamp() {
        let builder = update_query(&AccountId::new(), AccountPatch::default(), Utc::now());

        assert_eq!(
            builder.sql(),
            format!(
                "UPDATE accounts SET updated_at = $1 WHERE id = $2 RETURNING {}",
                COLUMNS
            )
        );
    }

    // Run with `cargo test -- --ignored` and DATABASE_URL pointing at a
    // server where the test user may create databases.

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_partial_update_keeps_unset_columns(pool: PgPool) {
        let repository = PostgresAccountRepository::new(pool);
        let created = repository
            .create(draft("alice", "alice@example.com"))
            .await
            .unwrap();

        let patch = AccountPatch {
            full_name: Patch::Set(None),
            privileged: Patch::Set(true),
            ..Default::default()
        };
        let updated = repository.update(&created.id, patch).await.unwrap();

        assert!(updated.full_name.is_none());
        assert!(updated.privileged);
        assert_eq!(updated.username, created.username);
        assert_eq!(updated.email, created.email);
        assert_eq!(updated.password_hash, created.password_hash);
        assert!(updated.active);

        let stored = repository.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_unique_violations_map_to_conflict(pool: PgPool) {
        let repository = PostgresAccountRepository::new(pool);
        repository
            .create(draft("alice", "alice@example.com"))
            .await
            .unwrap();
        let bob = repository
            .create(draft("bob", "bob@example.com"))
            .await
            .unwrap();

        let duplicate = repository.create(draft("alice", "other@example.com")).await;
        assert!(matches!(
            duplicate,
            Err(RepositoryError::Conflict { field: Account::USERNAME_KEY, ref value }) if value == "alice"
        ));

        let patch = AccountPatch {
            email: Patch::Set(EmailAddress::new("alice@example.com".to_string()).unwrap()),
            ..Default::default()
        };
        let taken = repository.update(&bob.id, patch).await;
        assert!(matches!(
            taken,
            Err(RepositoryError::Conflict { field: Account::EMAIL_KEY, ref value }) if value == "alice@example.com"
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_update_missing_account_is_not_found(pool: PgPool) {
        let repository = PostgresAccountRepository::new(pool);

        let result = repository
            .update(&AccountId::new(), AccountPatch::default())
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
        assert!(!repository.delete(&AccountId::new()).await.unwrap());
    }
}
