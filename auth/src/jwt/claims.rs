use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Claims carried by a session token.
///
/// Standard RFC 7519 names on the wire: `sub`, `iat`, `exp`, `jti`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (entity identifier)
    pub sub: String,

    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,

    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,

    /// Token identifier, only meaningful to a denylist
    pub jti: String,
}

impl Claims {
    /// Build claims for a subject, valid for `ttl` from `issued_at`.
    pub fn new(subject: impl ToString, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Check if the token is expired at `now`, tolerating `leeway` seconds.
    pub fn is_expired(&self, now: i64, leeway: i64) -> bool {
        now > self.exp.saturating_add(leeway)
    }

    /// Check if the token claims to be issued later than `now + leeway`.
    pub fn is_issued_in_future(&self, now: i64, leeway: i64) -> bool {
        self.iat > now.saturating_add(leeway)
    }
}
