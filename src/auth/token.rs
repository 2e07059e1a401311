//! Token Codec
//! Mission: Issue and verify HMAC-signed bearer tokens
//!
//! Tokens are compact three-segment HS256 JWTs. Expiry is checked against the
//! injected clock rather than the validator's wall clock, with zero leeway,
//! so an expired token is expired on the boundary.

use crate::auth::models::{Claims, TOKEN_NORMAL_HOURS, TOKEN_REMEMBER_HOURS};
use crate::clock::Clock;
use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::debug;

pub struct TokenCodec {
    secret: String,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(secret: String, clock: Arc<dyn Clock>) -> Self {
        Self { secret, clock }
    }

    pub fn lifetime_hours(remember: bool) -> i64 {
        if remember {
            TOKEN_REMEMBER_HOURS
        } else {
            TOKEN_NORMAL_HOURS
        }
    }

    /// Issue a token for a subject. Deterministic for fixed inputs and clock.
    pub fn issue(
        &self,
        subject_id: &str,
        email: &str,
        remember: bool,
        login_time_ms: i64,
        lifetime_hours: i64,
    ) -> Result<String> {
        let now_secs = self.clock.now_ms() / 1000;
        let claims = Claims {
            sub: subject_id.to_string(),
            email: email.to_string(),
            remember,
            login_time_ms,
            iat: now_secs as usize,
            exp: (now_secs + lifetime_hours * 3600) as usize,
        };

        debug!(
            "Issuing token for {} ({}), expires in {}h",
            email, subject_id, lifetime_hours
        );

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to issue token")
    }

    /// Verify a token. Malformed, tampered or expired tokens all read as `None`.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared against the injected clock below.
        validation.validate_exp = false;
        validation.set_required_spec_claims::<&str>(&[]);

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .ok()?;

        let now_secs = self.clock.now_ms() / 1000;
        if now_secs > decoded.claims.exp as i64 {
            debug!("Rejecting expired token for {}", decoded.claims.email);
            return None;
        }

        Some(decoded.claims)
    }

    /// Re-issue a token whose time-to-expiry fell below the threshold,
    /// carrying forward subject, remember flag and original login time.
    /// Returns the input unchanged when it is not near expiry, `None` when
    /// it does not verify at all.
    pub fn refresh_if_near_expiry(&self, token: &str, threshold_hours: i64) -> Option<String> {
        let claims = self.verify(token)?;

        let expires_in_ms = claims.exp as i64 * 1000 - self.clock.now_ms();
        if expires_in_ms >= threshold_hours * 3600 * 1000 {
            return Some(token.to_string());
        }

        debug!("Refreshing near-expiry token for {}", claims.email);
        self.issue(
            &claims.sub,
            &claims.email,
            claims.remember,
            claims.login_time_ms,
            Self::lifetime_hours(claims.remember),
        )
        .ok()
    }
}
