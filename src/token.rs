//! Credential decoding.
//!
//! Tokens are JWT-shaped strings issued by the UniHub backend. Only the payload is
//! read here; the signature is checked by the backend on every API call.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

/// Portal role carried by a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Lecturer,
    Student,
}

impl Role {
    /// Case-insensitive parse ("LECTURER", "Student", " student ")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lecturer" => Some(Self::Lecturer),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    /// Canonical lower-case form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lecturer => "lecturer",
            Self::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("expected 3 non-empty segments, found {0}")]
    Segments(usize),
    #[error("payload is not valid base64url")]
    Base64,
    #[error("payload is not a valid claims object: {0}")]
    Json(String),
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("missing subject identifier")]
    MissingSubject,
}

/// The three fields a session needs out of a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub role: Role,
    pub subject_id: String,
    /// Expiry, epoch seconds
    pub expires_at: i64,
}

impl Claims {
    /// A credential is valid only while `expires_at` is strictly in the future.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSubject {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpiry {
    Int(i64),
    Float(f64),
}

#[derive(Deserialize)]
struct RawClaims {
    role: String,
    #[serde(alias = "id", alias = "userId", alias = "user_id")]
    sub: Option<RawSubject>,
    exp: RawExpiry,
}

/// Decode a credential into its claims. Never panics on malformed input.
pub fn decode(token: &str) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(TokenError::Segments(segments.len()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|_| TokenError::Base64)?;
    let raw: RawClaims =
        serde_json::from_slice(&payload).map_err(|e| TokenError::Json(e.to_string()))?;

    let role = Role::parse(&raw.role).ok_or_else(|| TokenError::UnknownRole(raw.role.clone()))?;
    let subject_id = match raw.sub {
        Some(RawSubject::Text(s)) if !s.trim().is_empty() => s,
        Some(RawSubject::Number(n)) => n.to_string(),
        _ => return Err(TokenError::MissingSubject),
    };
    let expires_at = match raw.exp {
        RawExpiry::Int(n) => n,
        RawExpiry::Float(f) => f as i64,
    };

    Ok(Claims {
        role,
        subject_id,
        expires_at,
    })
}

/// Build an unsigned token around a JSON payload
#[cfg(test)]
pub(crate) fn encode_for_test(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, body)
}
