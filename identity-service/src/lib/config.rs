use std::env;
use std::fmt;
use std::sync::Arc;

use auth::Authenticator;
use auth::Clock;
use auth::Denylist;
use auth::HashingPool;
use auth::PasswordHasher;
use auth::TokenCodec;
use auth::TokenError;
use config::Config as ConfigBuilder;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    /// Privileged account created by the bootstrap binary.
    pub bootstrap: Option<BootstrapConfig>,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn default_max_connections() -> u32 {
        5
    }

    /// Connection URL with the password masked, for logging.
    pub fn redacted_url(&self) -> String {
        let Some(scheme_end) = self.url.find("://").map(|i| i + 3) else {
            return self.url.clone();
        };
        let rest = &self.url[scheme_end..];
        let authority = rest.find('/').map_or(rest, |i| &rest[..i]);
        let Some(at) = authority.rfind('@') else {
            return self.url.clone();
        };
        let Some(colon) = authority[..at].find(':') else {
            return self.url.clone();
        };

        format!(
            "{}{}:***{}",
            &self.url[..scheme_end],
            &authority[..colon],
            &rest[at..]
        )
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.redacted_url())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Raw authentication settings, validated by [`AuthConfig::validate`].
#[derive(Deserialize, Clone)]
pub struct AuthConfig {
    pub secret: String,
    #[serde(default = "AuthConfig::default_token_ttl_seconds")]
    pub token_ttl_seconds: i64,
    #[serde(default = "AuthConfig::default_hashing_cost")]
    pub hashing_cost: u32,
    #[serde(default = "AuthConfig::default_hashing_memory_kib")]
    pub hashing_memory_kib: u32,
    #[serde(default = "AuthConfig::default_clock_skew_seconds")]
    pub clock_skew_seconds: i64,
    #[serde(default = "AuthConfig::default_hashing_workers")]
    pub hashing_workers: usize,
    #[serde(default = "AuthConfig::default_hashing_timeout_ms")]
    pub hashing_timeout_ms: u64,
}

#[derive(Deserialize, Clone)]
pub struct BootstrapConfig {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

impl fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from files with environment variable overrides
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (DATABASE__URL, AUTH__SECRET, etc.)
    /// 2. Environment-specific config file (config/{environment}.toml)
    /// 3. Default config file (config/default.toml)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(environment())
    }

    fn load_with(environment: Environment) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let configuration = ConfigBuilder::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Layer on environment-specific configuration
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Layer on environment variables
            .add_source(environment)
            .build()?;

        let config: Config = configuration.try_deserialize()?;

        Ok(config)
    }
}

/// Unprefixed variables with `__` between levels: `AUTH__SECRET` sets
/// `auth.secret`.
fn environment() -> Environment {
    Environment::default().separator("__")
}

impl AuthConfig {
    pub const MIN_SECRET_LENGTH: usize = 32;
    pub const MAX_CLOCK_SKEW_SECONDS: i64 = 300;

    fn default_token_ttl_seconds() -> i64 {
        30 * 60
    }

    fn default_hashing_cost() -> u32 {
        PasswordHasher::DEFAULT_COST
    }

    fn default_hashing_memory_kib() -> u32 {
        PasswordHasher::DEFAULT_MEMORY_KIB
    }

    fn default_clock_skew_seconds() -> i64 {
        5
    }

    fn default_hashing_workers() -> usize {
        4
    }

    fn default_hashing_timeout_ms() -> u64 {
        5_000
    }

    /// Config with every field defaulted except the secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            token_ttl_seconds: Self::default_token_ttl_seconds(),
            hashing_cost: Self::default_hashing_cost(),
            hashing_memory_kib: Self::default_hashing_memory_kib(),
            clock_skew_seconds: Self::default_clock_skew_seconds(),
            hashing_workers: Self::default_hashing_workers(),
            hashing_timeout_ms: Self::default_hashing_timeout_ms(),
        }
    }

    /// Check every setting and freeze them into [`AuthSettings`].
    ///
    /// # Errors
    /// * `Message` - A setting is out of range
    pub fn validate(&self) -> Result<AuthSettings, ConfigError> {
        if self.secret.len() < Self::MIN_SECRET_LENGTH {
            return Err(invalid(format!(
                "auth.secret must be at least {} bytes",
                Self::MIN_SECRET_LENGTH
            )));
        }
        if self.token_ttl_seconds <= 0 {
            return Err(invalid("auth.token_ttl_seconds must be positive"));
        }
        if !(0..=Self::MAX_CLOCK_SKEW_SECONDS).contains(&self.clock_skew_seconds) {
            return Err(invalid(format!(
                "auth.clock_skew_seconds must be between 0 and {}",
                Self::MAX_CLOCK_SKEW_SECONDS
            )));
        }
        if self.hashing_workers == 0 {
            return Err(invalid("auth.hashing_workers must be at least 1"));
        }
        if self.hashing_timeout_ms == 0 {
            return Err(invalid("auth.hashing_timeout_ms must be positive"));
        }

        let hasher = PasswordHasher::with_cost(self.hashing_cost, self.hashing_memory_kib)
            .map_err(|e| invalid(format!("auth.hashing_cost/hashing_memory_kib: {}", e)))?;

        Ok(AuthSettings {
            secret: self.secret.clone(),
            token_ttl: chrono::Duration::seconds(self.token_ttl_seconds),
            clock_skew: chrono::Duration::seconds(self.clock_skew_seconds),
            hasher,
            hashing_workers: self.hashing_workers,
            hashing_timeout: std::time::Duration::from_millis(self.hashing_timeout_ms),
        })
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("hashing_cost", &self.hashing_cost)
            .field("hashing_memory_kib", &self.hashing_memory_kib)
            .field("clock_skew_seconds", &self.clock_skew_seconds)
            .field("hashing_workers", &self.hashing_workers)
            .field("hashing_timeout_ms", &self.hashing_timeout_ms)
            .finish_non_exhaustive()
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Message(message.into())
}

/// Validated, immutable authentication settings.
///
/// Only obtainable through [`AuthConfig::validate`].
#[derive(Clone)]
pub struct AuthSettings {
    secret: String,
    token_ttl: chrono::Duration,
    clock_skew: chrono::Duration,
    hasher: PasswordHasher,
    hashing_workers: usize,
    hashing_timeout: std::time::Duration,
}

impl AuthSettings {
    pub fn token_ttl(&self) -> chrono::Duration {
        self.token_ttl
    }

    pub fn clock_skew(&self) -> chrono::Duration {
        self.clock_skew
    }

    pub fn codec(&self, clock: Arc<dyn Clock>) -> Result<TokenCodec, TokenError> {
        TokenCodec::new(self.secret.as_bytes(), self.clock_skew, clock)
    }

    pub fn hashing_pool(&self) -> HashingPool {
        HashingPool::new(
            self.hasher.clone(),
            self.hashing_workers,
            self.hashing_timeout,
        )
    }

    /// Denylist whose retention matches `codec`'s leeway.
    pub fn denylist(&self, codec: &TokenCodec, clock: Arc<dyn Clock>) -> Denylist {
        Denylist::new(codec.leeway(), clock)
    }

    pub fn authenticator(&self, codec: Arc<TokenCodec>) -> Authenticator {
        Authenticator::new(self.hashing_pool(), codec, self.token_ttl)
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("token_ttl", &self.token_ttl)
            .field("clock_skew", &self.clock_skew)
            .field("hasher", &self.hasher)
            .field("hashing_workers", &self.hashing_workers)
            .field("hashing_timeout", &self.hashing_timeout)
            .finish_non_exhaustive()
    }
}
