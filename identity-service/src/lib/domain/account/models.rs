use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::account::errors::AccountIdError;
use crate::domain::account::errors::EmailError;
use crate::domain::account::errors::FullNameError;
use crate::domain::account::errors::PasswordPolicyError;
use crate::domain::account::errors::UsernameError;
use crate::domain::account::errors::ValidationError;
use crate::domain::repository::Entity;
use crate::domain::repository::Page;
use crate::domain::repository::Patch;
use crate::domain::repository::UniqueKey;

/// Account aggregate entity.
///
/// Represents a registered principal that can log in and be authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub username: Username,
    pub email: EmailAddress,
    pub full_name: Option<FullName>,
    pub password_hash: String,
    pub active: bool,
    pub privileged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub const USERNAME_KEY: &'static str = "username";
    pub const EMAIL_KEY: &'static str = "email";
}

impl Entity for Account {
    type Id = AccountId;
    type Draft = NewAccount;
    type Patch = AccountPatch;

    fn id(&self) -> &AccountId {
        &self.id
    }

    fn create(draft: NewAccount, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            username: draft.username,
            email: draft.email,
            full_name: draft.full_name,
            password_hash: draft.password_hash,
            active: true,
            privileged: draft.privileged,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, patch: AccountPatch, now: DateTime<Utc>) {
        patch.username.apply_to(&mut self.username);
        patch.email.apply_to(&mut self.email);
        patch.full_name.apply_to(&mut self.full_name);
        patch.password_hash.apply_to(&mut self.password_hash);
        patch.active.apply_to(&mut self.active);
        patch.privileged.apply_to(&mut self.privileged);
        self.updated_at = now;
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![
            UniqueKey::new(Self::USERNAME_KEY, self.username.as_str()),
            UniqueKey::new(Self::EMAIL_KEY, self.email.as_str()),
        ]
    }
}

/// Account unique identifier type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Generate a new random account ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an account ID from string.
    ///
    /// # Errors
    /// * `InvalidFormat` - String is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self, AccountIdError> {
        Uuid::parse_str(s)
            .map(AccountId)
            .map_err(|e| AccountIdError::InvalidFormat(e.to_string()))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Username value type
///
/// Ensures username is 3-50 characters and contains only alphanumeric, underscore, and hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    const MIN_LENGTH: usize = 3;
    const MAX_LENGTH: usize = 50;

    /// Create a new valid username.
    ///
    /// # Errors
    /// * `TooShort` - Username shorter than 3 characters
    /// * `TooLong` - Username longer than 50 characters
    /// * `InvalidCharacters` - Contains non-alphanumeric characters (except _ and -)
    pub fn new(username: String) -> Result<Self, UsernameError> {
        let username = Self::with_valid_length(username)?;
        let username = Self::with_valid_chars(username)?;
        Ok(Self(username))
    }

    fn with_valid_length(username: String) -> Result<String, UsernameError> {
        let length = username.chars().count();
        if length < Self::MIN_LENGTH {
            Err(UsernameError::TooShort {
                min: Self::MIN_LENGTH,
                actual: length,
            })
        } else if length > Self::MAX_LENGTH {
            Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
                actual: length,
            })
        } else {
            Ok(username)
        }
    }

    fn with_valid_chars(username: String) -> Result<String, UsernameError> {
        if username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            Ok(username)
        } else {
            Err(UsernameError::InvalidCharacters)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Email address type
///
/// Validates email format using RFC 5322 compliant parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new validated email address.
    ///
    /// # Errors
    /// * `InvalidFormat` - Email does not conform to RFC 5322
    pub fn new(email: String) -> Result<Self, EmailError> {
        email_address::EmailAddress::from_str(&email)
            .map(|_| EmailAddress(email))
            .map_err(|e| EmailError::InvalidFormat(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Display name, at most 100 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullName(String);

impl FullName {
    const MAX_LENGTH: usize = 100;

    pub fn new(full_name: String) -> Result<Self, FullNameError> {
        let length = full_name.chars().count();
        if length > Self::MAX_LENGTH {
            return Err(FullNameError::TooLong {
                max: Self::MAX_LENGTH,
                actual: length,
            });
        }
        Ok(Self(full_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Plaintext password that satisfies the length policy.
///
/// Never printed; it only lives until it is hashed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    const MIN_LENGTH: usize = 8;
    const MAX_LENGTH: usize = 100;

    /// # Errors
    /// * `TooShort` - Fewer than 8 characters
    /// * `TooLong` - More than 100 characters
    pub fn new(password: String) -> Result<Self, PasswordPolicyError> {
        let length = password.chars().count();
        if length < Self::MIN_LENGTH {
            Err(PasswordPolicyError::TooShort {
                min: Self::MIN_LENGTH,
                actual: length,
            })
        } else if length > Self::MAX_LENGTH {
            Err(PasswordPolicyError::TooLong {
                max: Self::MAX_LENGTH,
                actual: length,
            })
        } else {
            Ok(Self(password))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Fields for a new account row. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: Username,
    pub email: EmailAddress,
    pub full_name: Option<FullName>,
    pub password_hash: String,
    pub privileged: bool,
}

/// Storage-level partial update of an account.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub username: Patch<Username>,
    pub email: Patch<EmailAddress>,
    pub full_name: Patch<Option<FullName>>,
    pub password_hash: Patch<String>,
    pub active: Patch<bool>,
    pub privileged: Patch<bool>,
}

/// Command to register a new account with domain types
#[derive(Debug, Clone)]
pub struct RegisterAccount {
    pub username: Username,
    pub email: EmailAddress,
    pub password: Password,
    pub full_name: Option<FullName>,
}

impl RegisterAccount {
    /// Validate raw registration input.
    ///
    /// # Errors
    /// * `ValidationError` - Any field violates its constraints
    pub fn new(
        username: String,
        email: String,
        password: String,
        full_name: Option<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            username: Username::new(username)?,
            email: EmailAddress::new(email)?,
            password: Password::new(password)?,
            full_name: full_name.map(FullName::new).transpose()?,
        })
    }
}

/// Raw partial update as received from a client.
///
/// Absent keys are left alone; `"full_name": null` clears the name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub username: Patch<String>,
    #[serde(default)]
    pub email: Patch<String>,
    #[serde(default)]
    pub full_name: Patch<Option<String>>,
    #[serde(default)]
    pub password: Patch<String>,
    #[serde(default)]
    pub active: Patch<bool>,
    #[serde(default)]
    pub privileged: Patch<bool>,
}

impl UpdateAccountRequest {
    /// Validate every field that is present.
    ///
    /// # Errors
    /// * `ValidationError` - A present field violates its constraints
    pub fn try_into_command(self) -> Result<UpdateAccount, ValidationError> {
        Ok(UpdateAccount {
            username: self.username.try_map(Username::new)?,
            email: self.email.try_map(EmailAddress::new)?,
            full_name: self
                .full_name
                .try_map(|name| name.map(FullName::new).transpose())?,
            password: self.password.try_map(Password::new)?,
            active: self.active,
            privileged: self.privileged,
        })
    }
}

/// Command to update an existing account with validated fields.
#[derive(Debug, Clone, Default)]
pub struct UpdateAccount {
    pub username: Patch<Username>,
    pub email: Patch<EmailAddress>,
    pub full_name: Patch<Option<FullName>>,
    pub password: Patch<Password>,
    pub active: Patch<bool>,
    pub privileged: Patch<bool>,
}

impl UpdateAccount {
    /// Whether the update changes `active` or `privileged`.
    pub fn touches_privileges(&self) -> bool {
        self.active.is_set() || self.privileged.is_set()
    }
}

/// One page of a listing plus the overall count.
#[derive(Debug, Clone)]
pub struct AccountPage {
    pub items: Vec<Account>,
    pub total: u64,
    pub page: Page,
}
