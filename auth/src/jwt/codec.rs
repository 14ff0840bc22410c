use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use jsonwebtoken::crypto;
use jsonwebtoken::decode_header;
use jsonwebtoken::encode;
use jsonwebtoken::Algorithm;
use jsonwebtoken::Header;

use super::claims::Claims;
use super::errors::TokenError;
use super::keys::KeyRing;
use crate::clock::Clock;
use crate::clock::SystemClock;

/// Signing algorithm for every token this codec issues or accepts.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Default tolerance for clock differences between issuer and validator.
pub const DEFAULT_LEEWAY_SECONDS: i64 = 5;

/// A freshly issued token together with the claims it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub claims: Claims,
}

impl IssuedToken {
    pub const TOKEN_TYPE: &'static str = "bearer";

    pub fn token_type(&self) -> &'static str {
        Self::TOKEN_TYPE
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims.expires_at()
    }
}

/// Issues and validates signed, time-bounded session tokens.
///
/// Tokens are `base64url(header).base64url(claims).signature` with an
/// HMAC-SHA256 signature. Validity depends only on the token bytes, the key
/// ring and the clock; no session state is kept.
pub struct TokenCodec {
    keys: RwLock<Arc<KeyRing>>,
    leeway: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Create a codec.
    ///
    /// # Arguments
    /// * `secret` - HMAC secret, at least 32 bytes
    /// * `leeway` - Clock-skew tolerance applied to `exp` and `iat`
    /// * `clock` - Time source
    ///
    /// # Errors
    /// * `InvalidKey` - Secret is too short
    pub fn new(secret: &[u8], leeway: Duration, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        let leeway = leeway.max(Duration::zero());
        Ok(Self {
            keys: RwLock::new(Arc::new(KeyRing::new(secret, leeway.num_seconds())?)),
            leeway,
            clock,
        })
    }

    /// Codec on the system clock with the default leeway.
    pub fn with_secret(secret: &[u8]) -> Result<Self, TokenError> {
        Self::new(
            secret,
            Duration::seconds(DEFAULT_LEEWAY_SECONDS),
            Arc::new(SystemClock),
        )
    }

    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Issue a token for `subject`, valid for `ttl`.
    ///
    /// # Errors
    /// * `InvalidTtl` - `ttl` is zero or negative
    /// * `Signing` - Token encoding failed
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<IssuedToken, TokenError> {
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidTtl);
        }

        let keys = self.key_ring();
        let claims = Claims::new(subject, self.clock.now(), ttl);

        let mut header = Header::new(ALGORITHM);
        header.kid = Some(keys.current().kid().to_string());

        let access_token = encode(&header, &claims, keys.current().encoding())
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        keys.current().record_issued(claims.exp);

        Ok(IssuedToken {
            access_token,
            claims,
        })
    }

    /// Validate a token and return its claims.
    ///
    /// The signature is checked before the claims are parsed, so nothing in
    /// an unauthenticated payload is ever interpreted.
    ///
    /// # Errors
    /// * `Malformed` - Segments, header or claims do not parse, or the
    ///   timestamps are inconsistent
    /// * `BadSignature` - MAC mismatch, or the signing key is unknown or retired
    /// * `Expired` - `now` is past `exp` plus leeway
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let (signing_input, signature) = split_token(token)?;

        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }

        let now = self.clock.now().timestamp();
        let keys = self.key_ring();
        let key = keys
            .find(header.kid.as_deref(), now)
            .ok_or(TokenError::BadSignature)?;

        // Undecodable signatures are mismatches too, not parse failures.
        let verified = crypto::verify(signature, signing_input.as_bytes(), key.decoding(), ALGORITHM)
            .unwrap_or(false);
        if !verified {
            return Err(TokenError::BadSignature);
        }

        let claims = decode_claims(signing_input)?;

        let leeway = self.leeway.num_seconds();
        if claims.exp <= claims.iat {
            return Err(TokenError::Malformed(
                "expiration is not after issuance".to_string(),
            ));
        }
        if claims.is_issued_in_future(now, leeway) {
            return Err(TokenError::Malformed("issued in the future".to_string()));
        }
        if claims.is_expired(now, leeway) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Make `secret` the signing key.
    ///
    /// The previous key keeps validating for at least `grace`, and in any case
    /// until every token it signed has expired. The swap is atomic:
    /// concurrent validations see either the old or the new ring.
    ///
    /// # Errors
    /// * `InvalidKey` - Secret is too short
    pub fn rotate(&self, secret: &[u8], grace: Duration) -> Result<(), TokenError> {
        let now = self.clock.now().timestamp();
        let retire_at = now + grace.num_seconds().max(0);

        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        let rotated = keys.rotated(secret, retire_at, now)?;
        *keys = Arc::new(rotated);

        Ok(())
    }

    /// `kid` of the key new tokens are signed with.
    pub fn current_kid(&self) -> String {
        self.key_ring().current().kid().to_string()
    }

    fn key_ring(&self) -> Arc<KeyRing> {
        Arc::clone(&self.keys.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Split into (`header.claims`, `signature`), requiring exactly three
/// non-empty segments.
fn split_token(token: &str) -> Result<(&str, &str), TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(TokenError::Malformed(format!(
            "expected 3 non-empty segments, got {}",
            segments.len()
        )));
    }

    let signing_input_len = segments[0].len() + 1 + segments[1].len();
    Ok((&token[..signing_input_len], segments[2]))
}

fn decode_claims(signing_input: &str) -> Result<Claims, TokenError> {
    let encoded = signing_input
        .split('.')
        .nth(1)
        .ok_or_else(|| TokenError::Malformed("missing claims segment".to_string()))?;

    let payload = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| TokenError::Malformed(e.to_string()))?;

    serde_json::from_slice(&payload).map_err(|e| TokenError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    const SECRET: &[u8] = b"my_secret_key_at_least_32_bytes_long!";
    const OTHER_SECRET: &[u8] = b"another_secret_at_least_32_bytes_long";

    fn codec_with_clock(leeway: i64) -> (TokenCodec, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let codec = TokenCodec::new(SECRET, Duration::seconds(leeway), clock.clone()).unwrap();
        (codec, clock)
    }

    fn encode_segment(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_issue_and_validate() {
        let (codec, _clock) = codec_with_clock(0);

        let issued = codec.issue("user123", Duration::minutes(30)).unwrap();
        let claims = codec.validate(&issued.access_token).unwrap();

        assert_eq!(claims.sub, "user123");
        assert_eq!(claims, issued.claims);
        assert_eq!(claims.exp - claims.iat, 30 * 60);
        assert_eq!(issued.token_type(), "bearer");
    }

    #[test]
    fn test_token_has_three_segments_and_kid() {
        let (codec, _clock) = codec_with_clock(0);

        let issued = codec.issue("user123", Duration::minutes(1)).unwrap();
        assert_eq!(issued.access_token.split('.').count(), 3);

        let header = decode_header(&issued.access_token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
        assert_eq!(header.kid.as_deref(), Some("k1"));
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let (codec, _clock) = codec_with_clock(0);

        assert_eq!(
            codec.issue("user123", Duration::zero()),
            Err(TokenError::InvalidTtl)
        );
        assert_eq!(
            codec.issue("user123", Duration::seconds(-5)),
            Err(TokenError::InvalidTtl)
        );
    }

    #[test]
    fn test_expired_token() {
        let (codec, clock) = codec_with_clock(0);
        let issued = codec.issue("user123", Duration::seconds(60)).unwrap();

        clock.advance(Duration::seconds(60));
        assert!(codec.validate(&issued.access_token).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(
            codec.validate(&issued.access_token),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_leeway_tolerates_small_skew() {
        let (codec, clock) = codec_with_clock(5);
        let issued = codec.issue("user123", Duration::seconds(60)).unwrap();

        clock.advance(Duration::seconds(64));
        assert!(codec.validate(&issued.access_token).is_ok());

        clock.advance(Duration::seconds(2));
        assert_eq!(
            codec.validate(&issued.access_token),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_issued_in_future_is_malformed() {
        let (codec, clock) = codec_with_clock(5);
        let issued = codec.issue("user123", Duration::minutes(10)).unwrap();

        clock.advance(Duration::seconds(-4));
        assert!(codec.validate(&issued.access_token).is_ok());

        clock.advance(Duration::seconds(-2));
        assert!(matches!(
            codec.validate(&issued.access_token),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_any_signature_change_is_bad_signature() {
        let (codec, _clock) = codec_with_clock(0);
        let token = codec.issue("user123", Duration::minutes(5)).unwrap().access_token;

        let signature_start = token.rfind('.').unwrap() + 1;
        for position in signature_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[position] = if bytes[position] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();

            assert_eq!(
                codec.validate(&tampered),
                Err(TokenError::BadSignature),
                "position {position}"
            );
        }
    }

    #[test]
    fn test_tampered_claims_are_bad_signature() {
        let (codec, _clock) = codec_with_clock(0);
        let token = codec.issue("user123", Duration::minutes(5)).unwrap().access_token;
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = encode_segment(&json!({
            "sub": "admin",
            "iat": 0,
            "exp": i64::MAX,
            "jti": "forged",
        }));
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);

        assert_eq!(codec.validate(&forged), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let (codec, _clock) = codec_with_clock(0);
        let other = TokenCodec::with_secret(OTHER_SECRET).unwrap();

        let token = other.issue("user123", Duration::minutes(5)).unwrap().access_token;

        assert_eq!(codec.validate(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_malformed_tokens() {
        let (codec, _clock) = codec_with_clock(0);

        for token in ["", "abc", "a.b", "a.b.c.d", "..", "invalid.token.here"] {
            assert!(
                matches!(codec.validate(token), Err(TokenError::Malformed(_))),
                "token {token:?}"
            );
        }
    }

    #[test]
    fn test_unsupported_algorithm_is_malformed() {
        let (codec, _clock) = codec_with_clock(0);
        let header = encode_segment(&json!({ "alg": "HS512", "typ": "JWT" }));
        let claims = encode_segment(&json!({ "sub": "x", "iat": 0, "exp": 1, "jti": "j" }));

        let token = format!("{header}.{claims}.c2lnbmF0dXJl");

        assert!(matches!(
            codec.validate(&token),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_signed_garbage_claims_are_malformed() {
        let (codec, _clock) = codec_with_clock(0);
        let keys = codec.key_ring();

        let header = encode_segment(&json!({ "alg": "HS256", "typ": "JWT", "kid": "k1" }));
        let claims = URL_SAFE_NO_PAD.encode(b"not json");
        let signing_input = format!("{header}.{claims}");
        let signature =
            crypto::sign(signing_input.as_bytes(), keys.current().encoding(), ALGORITHM).unwrap();

        let token = format!("{signing_input}.{signature}");

        assert!(matches!(
            codec.validate(&token),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_rotation_keeps_old_tokens_until_they_expire() {
        let (codec, clock) = codec_with_clock(5);
        let old_token = codec.issue("user123", Duration::minutes(30)).unwrap().access_token;

        codec.rotate(OTHER_SECRET, Duration::zero()).unwrap();
        assert_eq!(codec.current_kid(), "k2");

        let new_token = codec.issue("user123", Duration::hours(2)).unwrap().access_token;
        clock.advance(Duration::seconds(1));
        assert!(codec.validate(&old_token).is_ok());
        assert!(codec.validate(&new_token).is_ok());

        // Up to the token's own expiry plus leeway.
        clock.advance(Duration::seconds(1804));
        assert!(codec.validate(&old_token).is_ok());

        clock.advance(Duration::seconds(1));
        assert!(codec.validate(&old_token).is_err());
        assert!(codec.validate(&new_token).is_ok());
    }

    #[test]
    fn test_rotation_grace_covers_unissued_key() {
        let (codec, clock) = codec_with_clock(0);
        codec.rotate(OTHER_SECRET, Duration::hours(1)).unwrap();

        // A token minted elsewhere with the retired key, never seen by `issue`.
        let keys = codec.key_ring();
        let retired = keys.find(Some("k1"), clock.now().timestamp()).unwrap();
        let claims = Claims::new("user123", clock.now(), Duration::hours(2));
        let mut header = Header::new(ALGORITHM);
        header.kid = Some("k1".to_string());
        let token = encode(&header, &claims, retired.encoding()).unwrap();

        assert!(codec.validate(&token).is_ok());

        clock.advance(Duration::hours(1) + Duration::seconds(1));
        assert_eq!(codec.validate(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_rotation_rejects_short_secret() {
        let (codec, _clock) = codec_with_clock(0);

        let result = codec.rotate(b"short", Duration::hours(1));

        assert!(matches!(result, Err(TokenError::InvalidKey(_))));
        assert_eq!(codec.current_kid(), "k1");
    }

    #[test]
    fn test_real_clock_expiry() {
        let codec = TokenCodec::new(SECRET, Duration::zero(), Arc::new(SystemClock)).unwrap();
        let issued = codec.issue("user123", Duration::seconds(1)).unwrap();

        assert_eq!(codec.validate(&issued.access_token).unwrap().sub, "user123");

        std::thread::sleep(std::time::Duration::from_secs(2));

        assert_eq!(
            codec.validate(&issued.access_token),
            Err(TokenError::Expired)
        );
    }
}
