use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;

use super::errors::TokenError;

/// Shortest accepted HMAC secret, in bytes (256 bits for HS256).
pub const MIN_SECRET_LENGTH: usize = 32;

/// One HMAC secret with the `kid` it is published under.
pub struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    /// End of the rotation grace period. `None` for the active key.
    retire_at: Option<i64>,
    /// Latest `exp` of any token signed with this key. Shared with the
    /// retiring copy so late issuances still count.
    issued_until: Arc<AtomicI64>,
}

impl SigningKey {
    pub fn new(kid: impl Into<String>, secret: &[u8]) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(TokenError::InvalidKey(format!(
                "secret must be at least {} bytes, got {}",
                MIN_SECRET_LENGTH,
                secret.len()
            )));
        }

        Ok(Self {
            kid: kid.into(),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            retire_at: None,
            issued_until: Arc::new(AtomicI64::new(i64::MIN)),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub(crate) fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }

    /// Note that a token expiring at `exp` was signed with this key.
    pub(crate) fn record_issued(&self, exp: i64) {
        self.issued_until.fetch_max(exp, Ordering::AcqRel);
    }

    /// A retiring key validates until its grace period ends or the last
    /// token it signed expires, whichever is later.
    fn is_live(&self, now: i64, leeway: i64) -> bool {
        self.retire_at.map_or(true, |retire_at| {
            let expiry = self
                .issued_until
                .load(Ordering::Acquire)
                .saturating_add(leeway);
            now <= retire_at.max(expiry)
        })
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("retire_at", &self.retire_at)
            .field("issued_until", &self.issued_until.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of the active key and the keys being retired.
///
/// Rotation builds a new ring; readers keep whichever snapshot they
/// already hold.
#[derive(Debug)]
pub struct KeyRing {
    current: Arc<SigningKey>,
    previous: Vec<Arc<SigningKey>>,
    generation: u64,
    /// Clock-skew tolerance, in seconds, added to issued expiries.
    leeway: i64,
}

impl KeyRing {
    pub fn new(secret: &[u8], leeway: i64) -> Result<Self, TokenError> {
        Ok(Self {
            current: Arc::new(SigningKey::new(Self::kid_for(1), secret)?),
            previous: Vec::new(),
            generation: 1,
            leeway: leeway.max(0),
        })
    }

    pub fn current(&self) -> &SigningKey {
        &self.current
    }

    /// Ring with `secret` as the active key.
    ///
    /// The old active key keeps validating until `retire_at`, or until the
    /// last token it signed expires if that is later. Keys already past
    /// retirement are dropped.
    pub fn rotated(&self, secret: &[u8], retire_at: i64, now: i64) -> Result<Self, TokenError> {
        let generation = self.generation + 1;
        let current = Arc::new(SigningKey::new(Self::kid_for(generation), secret)?);

        let retiring = Arc::new(SigningKey {
            kid: self.current.kid.clone(),
            encoding: self.current.encoding.clone(),
            decoding: self.current.decoding.clone(),
            retire_at: Some(retire_at),
            issued_until: Arc::clone(&self.current.issued_until),
        });

        let previous = std::iter::once(retiring)
            .chain(self.previous.iter().cloned())
            .filter(|key| key.is_live(now, self.leeway))
            .collect();

        Ok(Self {
            current,
            previous,
            generation,
            leeway: self.leeway,
        })
    }

    /// Key that may validate a token with the given `kid` at `now`.
    ///
    /// Tokens without a `kid` are checked against the active key only.
    pub fn find(&self, kid: Option<&str>, now: i64) -> Option<&SigningKey> {
        let Some(kid) = kid else {
            return Some(&self.current);
        };

        std::iter::once(&self.current)
            .chain(self.previous.iter())
            .find(|key| key.kid == kid && key.is_live(now, self.leeway))
            .map(|key| &**key)
    }

    /// Number of retired keys still accepted for validation.
    pub fn retiring_keys(&self) -> usize {
        self.previous.len()
    }

    fn kid_for(generation: u64) -> String {
        format!("k{}", generation)
    }
}
