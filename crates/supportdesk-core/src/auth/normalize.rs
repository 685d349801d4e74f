//! Payload normalization.
//!
//! Backends disagree on where tokens live (top level or under `session`) and
//! on how fields are spelled (`access_token` vs `accessToken`). Everything is
//! folded into one `AuthSession` here:
//! - top-level token fields win over nested `session.*` fields
//! - `expires_at` falls back to `expires_in`, then to now + 24h
//! - `user_metadata.full_name` / `user_metadata.avatar_url` win over top-level duplicates
//! - a missing role becomes `"user"`

use serde_json::{Map, Value};

use super::types::{AuthSession, AuthUser, DEFAULT_ROLE, DEFAULT_SESSION_LIFETIME_SECS};
use super::AuthError;

const ACCESS_TOKEN_KEYS: [&str; 2] = ["access_token", "accessToken"];
const REFRESH_TOKEN_KEYS: [&str; 2] = ["refresh_token", "refreshToken"];
const EXPIRES_AT_KEYS: [&str; 2] = ["expires_at", "expiresAt"];
const EXPIRES_IN_KEYS: [&str; 2] = ["expires_in", "expiresIn"];
const FULL_NAME_KEYS: [&str; 2] = ["full_name", "fullName"];
const AVATAR_URL_KEYS: [&str; 2] = ["avatar_url", "avatarUrl"];
const USER_METADATA_KEYS: [&str; 2] = ["user_metadata", "userMetadata"];

/// Credentials kept from the previous session when a renewal payload omits them.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetainedCredentials<'a> {
    pub access_token: Option<&'a str>,
    pub refresh_token: Option<&'a str>,
}

/// Fold a raw backend payload into an `AuthSession`, using `now` (epoch
/// seconds) for defaulted expiries.
pub fn normalize_session(
    payload: &Value,
    retained: RetainedCredentials<'_>,
    now: i64,
) -> Result<AuthSession, AuthError> {
    let top = payload
        .as_object()
        .ok_or_else(|| AuthError::InvalidResponse("Expected a JSON object".to_string()))?;
    let nested = top.get("session").and_then(Value::as_object);

    let access_token = string_field(top, nested, &ACCESS_TOKEN_KEYS)
        .or_else(|| retained.access_token.map(str::to_string))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidResponse("Missing access token".to_string()))?;

    let refresh_token = string_field(top, nested, &REFRESH_TOKEN_KEYS)
        .or_else(|| retained.refresh_token.map(str::to_string))
        .filter(|t| !t.is_empty());

    let expires_at = integer_field(top, nested, &EXPIRES_AT_KEYS)
        .or_else(|| {
            integer_field(top, nested, &EXPIRES_IN_KEYS).map(|secs| now.saturating_add(secs))
        })
        .unwrap_or(now.saturating_add(DEFAULT_SESSION_LIFETIME_SECS));

    let raw_user = top
        .get("user")
        .and_then(Value::as_object)
        .or_else(|| nested.and_then(|s| s.get("user")).and_then(Value::as_object))
        .ok_or_else(|| AuthError::InvalidResponse("Missing user".to_string()))?;

    Ok(AuthSession {
        access_token,
        refresh_token,
        expires_at,
        user: normalize_user(raw_user)?,
    })
}

fn normalize_user(raw: &Map<String, Value>) -> Result<AuthUser, AuthError> {
    let id = match raw.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(AuthError::InvalidResponse("Missing user id".to_string())),
    };

    let metadata = first_present(raw, &USER_METADATA_KEYS).and_then(Value::as_object);
    let profile_field = |keys: &[&str]| {
        metadata
            .and_then(|m| first_string(m, keys))
            .or_else(|| first_string(raw, keys))
    };

    Ok(AuthUser {
        id,
        email: first_string(raw, &["email"]).unwrap_or_default(),
        full_name: profile_field(&FULL_NAME_KEYS[..]),
        avatar_url: profile_field(&AVATAR_URL_KEYS[..]),
        role: Some(first_string(raw, &["role"]).unwrap_or_else(|| DEFAULT_ROLE.to_string())),
    })
}

/// Look a field up at the top level first, then in the nested session object
fn string_field(
    top: &Map<String, Value>,
    nested: Option<&Map<String, Value>>,
    keys: &[&str],
) -> Option<String> {
    first_string(top, keys).or_else(|| nested.and_then(|s| first_string(s, keys)))
}

fn integer_field(
    top: &Map<String, Value>,
    nested: Option<&Map<String, Value>>,
    keys: &[&str],
) -> Option<i64> {
    first_integer(top, keys).or_else(|| nested.and_then(|s| first_integer(s, keys)))
}

fn first_present<'m>(map: &'m Map<String, Value>, keys: &[&str]) -> Option<&'m Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integers, floats (truncated) and numeric strings are all accepted
fn first_integer(map: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().filter_map(|k| map.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}
