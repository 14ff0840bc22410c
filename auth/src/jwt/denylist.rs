use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use chrono::Duration;

use super::claims::Claims;
use crate::clock::Clock;

/// Revocation list for tokens that must stop working before they expire.
///
/// Kept apart from [`TokenCodec`](super::TokenCodec), which stays stateless.
/// Entries are keyed by the token's `jti` and dropped once the token would
/// have expired anyway, so the list never grows past the set of live tokens.
/// `leeway` must match the codec's, or a revoked token could come back to
/// life inside the skew window.
pub struct Denylist {
    entries: RwLock<HashMap<String, i64>>,
    leeway: i64,
    clock: Arc<dyn Clock>,
}

impl Denylist {
    pub fn new(leeway: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            leeway: leeway.num_seconds().max(0),
            clock,
        }
    }

    /// Revoke the token carrying `claims` until its natural expiry.
    pub fn revoke(&self, claims: &Claims) {
        self.prune();

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(claims.jti.clone(), claims.exp);
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }

    /// Drop entries whose tokens have expired. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = self.clock.now().timestamp();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let before = entries.len();
        entries.retain(|_, exp| !claims_expired(*exp, now, self.leeway));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn claims_expired(exp: i64, now: i64, leeway: i64) -> bool {
    now > exp.saturating_add(leeway)
}
