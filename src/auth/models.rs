//! Authentication Models
//! Mission: Claims, login results and the observable auth state

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum wrong-secret attempts before an account locks.
pub const MAX_ATTEMPTS: u32 = 5;
/// How long a locked account stays locked.
pub const LOCKOUT_MS: i64 = 30 * 60 * 1000;

/// Token lifetime for a plain session, in hours.
pub const TOKEN_NORMAL_HOURS: i64 = 8;
/// Token lifetime for a remember-me session, in hours.
pub const TOKEN_REMEMBER_HOURS: i64 = 24 * 30;

/// Session expiry for a plain session.
pub const NORMAL_SESSION_MS: i64 = 8 * 60 * 60 * 1000;
/// Session expiry for a remember-me session.
pub const REMEMBER_SESSION_MS: i64 = 30 * 24 * 60 * 60 * 1000;
/// Non-remember sessions also die after this much inactivity.
pub const INACTIVITY_LIMIT_MS: i64 = 2 * 60 * 60 * 1000;

/// Token claims. `login_time_ms` survives refreshes; `iat`/`exp` do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub remember: bool,
    pub login_time_ms: i64,
    pub iat: usize,
    pub exp: usize,
}

/// Authenticated identity as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectInfo {
    pub id: Uuid,
    pub email: String,
}

/// Outcome of one credential check.
#[derive(Debug)]
pub enum CredentialOutcome {
    Verified(crate::store::AccountRecord),
    /// Wrong email or secret. Reported identically for both.
    Invalid { remaining_attempts: u32 },
    Locked { remaining_minutes: i64 },
}

/// Result of a login operation, shaped for the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<SubjectInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

impl LoginResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            token: None,
            subject: None,
            error: Some(error.into()),
            is_locked: false,
            remaining_attempts: None,
        }
    }
}

/// Observable auth state published on a watch channel.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSnapshot {
    pub is_authenticated: bool,
    pub subject: Option<SubjectInfo>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_locked: bool,
    pub remaining_attempts: u32,
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            subject: None,
            is_loading: true,
            error: None,
            is_locked: false,
            remaining_attempts: MAX_ATTEMPTS,
        }
    }
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

/// Result of a local session validity check.
#[derive(Debug, Clone)]
pub struct SessionCheck {
    pub valid: bool,
    pub subject: Option<SubjectInfo>,
}

impl SessionCheck {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            subject: None,
        }
    }
}
