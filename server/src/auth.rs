//! Cookie/bearer-token plumbing and actor derivation over axum
//! `HeaderMap`s (spec §3 "Anon session", §4.1 "Actor derivation").
//!
//! This module is the only place that knows the wire shape of the
//! `geo_sim_sid` cookie and the `X-Simulator-Owner`/`Origin` headers; the
//! actual precedence rule lives in `engine::registry::derive_actor` so it
//! stays testable without an HTTP stack.

use axum::http::HeaderMap;
use credit_sim_engine::models::owner::{Actor, AnonSession};
use credit_sim_engine::registry::derive_actor;
use credit_sim_engine::CoreError;
use rand::RngCore;

pub const SESSION_COOKIE_NAME: &str = "geo_sim_sid";

pub struct CookieJar<'a> {
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> CookieJar<'a> {
    pub fn parse(headers: &'a HeaderMap) -> Self {
        let mut pairs = Vec::new();
        for header in headers.get_all(axum::http::header::COOKIE) {
            let Ok(raw) = header.to_str() else { continue };
            for part in raw.split(';') {
                if let Some((k, v)) = part.trim().split_once('=') {
                    pairs.push((k, v));
                }
            }
        }
        Self { pairs }
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.pairs.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Mint a fresh anon session cookie value (spec §4.1 "Session ensure").
pub fn mint_session(secret: &[u8], now: u64) -> (String, String) {
    let mut sid_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut sid_bytes);
    let sid = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, sid_bytes);
    let (session, token) = AnonSession::mint(sid, now, secret);
    (session.sid, token)
}

/// Verify the `geo_sim_sid` cookie, if present, returning its `sid`.
pub fn verify_session_cookie(headers: &HeaderMap, secret: &[u8], now: u64, ttl_sec: u64) -> Option<String> {
    let jar = CookieJar::parse(headers);
    let token = jar.get(SESSION_COOKIE_NAME)?;
    AnonSession::verify(token, secret, now, ttl_sec).ok().map(|s| s.sid)
}

/// Derive the acting identity for one request (spec §4.1, strict
/// priority order). `admin_token` is the process-configured bearer
/// secret; participant bearer verification is an external collaborator
/// (spec §1 "authentication primitives ... out of scope") represented
/// here only by the `Authorization: Bearer participant:<sub>` convention
/// used by this crate's own test harness and CLI.
pub fn actor_from_headers(
    headers: &HeaderMap,
    admin_token: Option<&str>,
    secret: &[u8],
    now: u64,
    ttl_sec: u64,
) -> Result<Actor, CoreError> {
    let bearer = header_str(headers, "authorization").and_then(|v| v.strip_prefix("Bearer "));

    let admin_valid = match (admin_token, bearer) {
        (Some(expected), Some(given)) => given == expected,
        _ => false,
    };

    let owner_override = header_str(headers, "x-simulator-owner");
    let participant_sub = bearer.and_then(|b| b.strip_prefix("participant:"));
    let anon_sid = verify_session_cookie(headers, secret, now, ttl_sec);

    derive_actor(admin_valid, owner_override, participant_sub, anon_sid.as_deref())
}

pub fn is_https(headers: &HeaderMap) -> bool {
    header_str(headers, "x-forwarded-proto").map(|p| p.eq_ignore_ascii_case("https")).unwrap_or(false)
}

pub fn set_cookie_header(sid_token: &str, secure: bool, ttl_sec: u64) -> String {
    let secure_attr = if secure { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE_NAME}={sid_token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={ttl_sec}{secure_attr}"
    )
}
