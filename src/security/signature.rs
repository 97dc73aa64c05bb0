//! HMAC request signatures with replay protection.
//!
//! Clients sign `"{timestamp}:{body}"` with the shared secret using
//! HMAC-SHA256 and send the lower-case hex digest in `X-Request-Signature`
//! together with the unix timestamp in `X-Request-Timestamp`. The timestamp
//! must fall within the skew window regardless of whether the digest matches.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::clock::SharedClock;

type HmacSha256 = Hmac<Sha256>;

/// Maximum distance between the signed timestamp and now.
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_secs(300);

/// Why a signature was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature or timestamp")]
    Missing,
    #[error("timestamp is not an integer")]
    MalformedTimestamp,
    #[error("timestamp outside the accepted window")]
    Stale,
    #[error("signature does not match")]
    Mismatch,
}

/// Verifies signed requests against a shared secret.
pub struct SignatureValidator {
    secret: Option<Vec<u8>>,
    max_skew: Duration,
    clock: SharedClock,
}

impl SignatureValidator {
    /// An empty secret disables enforcement: every request validates.
    pub fn new(secret: &str, max_skew: Duration, clock: SharedClock) -> Self {
        Self {
            secret: (!secret.is_empty()).then(|| secret.as_bytes().to_vec()),
            max_skew,
            clock,
        }
    }

    pub fn is_enforcing(&self) -> bool {
        self.secret.is_some()
    }

    pub fn validate(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };

        let (signature, timestamp) = match (signature, timestamp) {
            (Some(s), Some(t)) if !s.is_empty() && !t.is_empty() => (s, t),
            _ => return Err(SignatureError::Missing),
        };

        let signed_at: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::MalformedTimestamp)?;

        let now_ms = i128::from(self.clock.now_millis());
        let skew_ms = (now_ms - i128::from(signed_at) * 1000).abs();
        if skew_ms > self.max_skew.as_millis() as i128 {
            tracing::warn!(
                timestamp = signed_at,
                skew_ms = skew_ms as i64,
                "Request timestamp too old or in the future"
            );
            return Err(SignatureError::Stale);
        }

        let expected = digest(secret, timestamp, body);
        if constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

/// Produce the hex signature a client sends for `body` at `timestamp`.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    digest(secret.as_bytes(), &timestamp.to_string(), body)
}

fn digest(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    // Length is public.
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    const SECRET: &str = "shared-secret";
    const NOW: u64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"name":"docs"}"#;

    fn validator(secret: &str) -> (SignatureValidator, Arc<ManualClock>) {
        let clock = ManualClock::shared(Duration::from_secs(NOW));
        (
            SignatureValidator::new(secret, DEFAULT_MAX_SKEW, clock.clone()),
            clock,
        )
    }

    fn check(v: &SignatureValidator, ts: i64, body_signed: &[u8], body_sent: &[u8]) -> Result<(), SignatureError> {
        let sig = sign(SECRET, ts, body_signed);
        v.validate(Some(&sig), Some(&ts.to_string()), body_sent)
    }

    #[test]
    fn test_accepts_exact_match() {
        let (v, _) = validator(SECRET);
        assert_eq!(check(&v, NOW as i64, BODY, BODY), Ok(()));
    }

    #[test]
    fn test_detects_single_byte_tamper() {
        let (v, _) = validator(SECRET);
        let mut tampered = BODY.to_vec();
        tampered[3] ^= 0x01;
        assert_eq!(check(&v, NOW as i64, BODY, &tampered), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_freshness_is_independent_of_digest() {
        let (v, _) = validator(SECRET);
        let old = NOW as i64 - 301;
        assert_eq!(check(&v, old, BODY, BODY), Err(SignatureError::Stale));

        let future = NOW as i64 + 301;
        assert_eq!(check(&v, future, BODY, BODY), Err(SignatureError::Stale));

        let edge = NOW as i64 - 300;
        assert_eq!(check(&v, edge, BODY, BODY), Ok(()));
    }

    #[test]
    fn test_skew_tracks_the_clock() {
        let (v, clock) = validator(SECRET);
        let ts = NOW as i64;
        clock.advance(Duration::from_millis(300_500));
        assert_eq!(check(&v, ts, BODY, BODY), Err(SignatureError::Stale));
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let (v, _) = validator(SECRET);
        let sig = sign(SECRET, NOW as i64, BODY);

        assert_eq!(v.validate(None, Some("1700000000"), BODY), Err(SignatureError::Missing));
        assert_eq!(v.validate(Some(&sig), None, BODY), Err(SignatureError::Missing));
        assert_eq!(v.validate(Some(""), Some("1700000000"), BODY), Err(SignatureError::Missing));
        assert_eq!(
            v.validate(Some(&sig), Some("yesterday"), BODY),
            Err(SignatureError::MalformedTimestamp)
        );
        assert_eq!(
            v.validate(Some(&sig), Some("1700000000.5"), BODY),
            Err(SignatureError::MalformedTimestamp)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let (v, _) = validator("other-secret");
        assert_eq!(check(&v, NOW as i64, BODY, BODY), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_no_secret_disables_enforcement() {
        let (v, _) = validator("");
        assert!(!v.is_enforcing());
        assert_eq!(v.validate(None, None, BODY), Ok(()));
    }

    #[test]
    fn test_sign_is_lowercase_hex() {
        let sig = sign(SECRET, 42, b"");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_ne!(sig, sign(SECRET, 43, b""));
    }
}
