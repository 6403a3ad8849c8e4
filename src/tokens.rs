use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Opaque share token handed out in report links. Only its digest is stored.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.trim().as_bytes()))
}

pub fn looks_like_token(token: &str) -> bool {
    let t = token.trim();
    t.len() == 32 && t.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn expires_at(issued: DateTime<Utc>, ttl_days: i64) -> DateTime<Utc> {
    issued + Duration::days(ttl_days.max(1))
}

/// False for unparsable timestamps.
pub fn is_live(expires_at: &str, now: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(t) => now < t.with_timezone(&Utc),
        Err(_) => false,
    }
}

pub fn report_link(public_url: &str, token: &str) -> String {
    format!("{}/report/{}", public_url.trim_end_matches('/'), token)
}
