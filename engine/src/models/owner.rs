//! Owner identity: derived actor strings and the anonymous session token
//! (spec §3, §4.1).
//!
//! `OwnerId` partitions run visibility by exact-string prefix match:
//! `admin`, `pid:<sub>`, `anon:<sid>`, or `cli:<normalized>`. The anon
//! session is a stateless, signed token so no server-side session store
//! is required — verification is just an HMAC recompute.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// A derived, exact-string-matched owner identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn admin() -> Self {
        Self("admin".to_string())
    }
    pub fn participant(sub: &str) -> Self {
        Self(format!("pid:{sub}"))
    }
    pub fn anon(sid: &str) -> Self {
        Self(format!("anon:{sid}"))
    }
    pub fn cli(normalized: &str) -> Self {
        Self(format!("cli:{normalized}"))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Which credential the owner id was derived from (spec §4.1, strict
/// priority order: admin+override, admin, participant bearer, anon cookie).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    CliOverride,
    Admin,
    Participant,
    Anon,
}

/// A resolved actor: an owner id plus whether it carries admin rights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub owner_id: OwnerId,
    pub kind: ActorKind,
    pub is_admin: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed session token")]
    Malformed,
    #[error("unsupported token version")]
    UnsupportedVersion,
    #[error("signature mismatch")]
    BadSignature,
    #[error("session expired")]
    Expired,
    #[error("issued-at is in the future beyond tolerated clock skew")]
    IssuedInFuture,
}

/// A minted (or verified) anonymous session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonSession {
    pub sid: String,
    pub iat: u64,
}

const TOKEN_VERSION: &str = "v1";
/// Clock skew tolerated only toward the past (spec §3).
const MAX_FUTURE_SKEW_SECS: u64 = 5;

impl AnonSession {
    /// Mint a fresh session for `sid` (16 random bytes, base64url-encoded
    /// by the caller) issued at `now` (unix seconds).
    pub fn mint(sid: String, now: u64, secret: &[u8]) -> (Self, String) {
        let session = AnonSession { sid, iat: now };
        let token = session.encode(secret);
        (session, token)
    }

    fn signing_input(sid: &str, iat: u64) -> String {
        format!("{TOKEN_VERSION}|{sid}|{iat}")
    }

    fn sign(secret: &[u8], sid: &str, iat: u64) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(Self::signing_input(sid, iat).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    pub fn encode(&self, secret: &[u8]) -> String {
        let sig = Self::sign(secret, &self.sid, self.iat);
        format!(
            "{TOKEN_VERSION}.{}.{}.{}",
            self.sid,
            self.iat,
            URL_SAFE_NO_PAD.encode(sig)
        )
    }

    /// Verify and decode `v1.<sid_b64url>.<iat_dec>.<sig_b64url>`, checking
    /// the HMAC, the `session_ttl_sec` window, and clock skew tolerance.
    pub fn verify(token: &str, secret: &[u8], now: u64, session_ttl_sec: u64) -> Result<Self, SessionError> {
        let mut parts = token.split('.');
        let version = parts.next().ok_or(SessionError::Malformed)?;
        let sid = parts.next().ok_or(SessionError::Malformed)?;
        let iat_str = parts.next().ok_or(SessionError::Malformed)?;
        let sig_str = parts.next().ok_or(SessionError::Malformed)?;
        if parts.next().is_some() {
            return Err(SessionError::Malformed);
        }
        if version != TOKEN_VERSION {
            return Err(SessionError::UnsupportedVersion);
        }
        let iat: u64 = iat_str.parse().map_err(|_| SessionError::Malformed)?;
        let given_sig = URL_SAFE_NO_PAD
            .decode(sig_str)
            .map_err(|_| SessionError::Malformed)?;

        let expected_sig = Self::sign(secret, sid, iat);
        if !constant_time_eq(&given_sig, &expected_sig) {
            return Err(SessionError::BadSignature);
        }

        if iat > now + MAX_FUTURE_SKEW_SECS {
            return Err(SessionError::IssuedInFuture);
        }
        if now.saturating_sub(iat) > session_ttl_sec {
            return Err(SessionError::Expired);
        }

        Ok(AnonSession {
            sid: sid.to_string(),
            iat,
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-only-secret-not-a-default";

    #[test]
    fn round_trips_mint_and_verify() {
        let (session, token) = AnonSession::mint("sid123".to_string(), 1_000, SECRET);
        let verified = AnonSession::verify(&token, SECRET, 1_010, 600).unwrap();
        assert_eq!(verified, session);
    }

    #[test]
    fn rejects_tampered_signature() {
        let (_, token) = AnonSession::mint("sid123".to_string(), 1_000, SECRET);
        let mut tampered = token.clone();
        tampered.push('x');
        assert_eq!(
            AnonSession::verify(&tampered, SECRET, 1_010, 600),
            Err(SessionError::BadSignature)
        );
    }

    #[test]
    fn rejects_expired_session() {
        let (_, token) = AnonSession::mint("sid123".to_string(), 1_000, SECRET);
        assert_eq!(
            AnonSession::verify(&token, SECRET, 1_000 + 601, 600),
            Err(SessionError::Expired)
        );
    }

    #[test]
    fn rejects_future_issued_at_beyond_skew() {
        let (_, token) = AnonSession::mint("sid123".to_string(), 1_000, SECRET);
        assert_eq!(
            AnonSession::verify(&token, SECRET, 1_000 - 10, 600),
            Err(SessionError::IssuedInFuture)
        );
    }

    #[test]
    fn owner_ids_are_partitioned_by_exact_prefix() {
        assert_eq!(OwnerId::admin().as_str(), "admin");
        assert_eq!(OwnerId::participant("u1").as_str(), "pid:u1");
        assert_eq!(OwnerId::anon("s1").as_str(), "anon:s1");
        assert_eq!(OwnerId::cli("bot-1").as_str(), "cli:bot-1");
    }
}
