//! Credential Verifier
//! Mission: Slow-hash secret checks with attempt tracking and lockout

use crate::auth::models::{CredentialOutcome, LOCKOUT_MS, MAX_ATTEMPTS};
use crate::clock::Clock;
use crate::store::RecordStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub struct CredentialVerifier {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Check a submitted secret against the stored hash.
    ///
    /// Drives the per-account UNLOCKED/LOCKED state machine: a lock that has
    /// expired is cleared before the check proceeds, a fifth consecutive
    /// failure sets it. Which of email/secret was wrong is never revealed.
    pub async fn verify(&self, email: &str, password: &str) -> Result<CredentialOutcome> {
        let account = match self
            .store
            .account_by_email(email)
            .await
            .context("Account lookup failed")?
        {
            Some(account) => account,
            None => {
                return Ok(CredentialOutcome::Invalid {
                    remaining_attempts: MAX_ATTEMPTS.saturating_sub(1),
                })
            }
        };

        let now_ms = self.clock.now_ms();
        let mut failed_attempts = account.failed_attempts;

        if account.is_locked {
            match account.lockout_until_ms {
                Some(until) if now_ms < until => {
                    let remaining_minutes = (until - now_ms + 59_999) / 60_000;
                    return Ok(CredentialOutcome::Locked { remaining_minutes });
                }
                _ => {
                    // Lock has expired: unlock and reset before proceeding.
                    info!("Lockout expired for {}, unlocking", email);
                    failed_attempts = 0;
                    if let Err(e) = self
                        .store
                        .update_account_security(email, 0, false, None)
                        .await
                    {
                        warn!("Failed to persist unlock for {}: {}", email, e);
                    }
                }
            }
        }

        let matches = bcrypt::verify(password, &account.password_hash)
            .context("Failed to verify password hash")?;

        if !matches {
            let new_count = failed_attempts + 1;
            let lock_now = new_count >= MAX_ATTEMPTS;
            let lockout_until = lock_now.then(|| now_ms + LOCKOUT_MS);

            // The lockout decision stands on the locally computed count even
            // when the increment cannot be persisted.
            if let Err(e) = self
                .store
                .update_account_security(email, new_count, lock_now, lockout_until)
                .await
            {
                warn!("Failed to persist attempt count for {}: {}", email, e);
            }

            if lock_now {
                warn!(
                    "Account locked after {} failed attempts: {}",
                    new_count, email
                );
            }

            return Ok(CredentialOutcome::Invalid {
                remaining_attempts: MAX_ATTEMPTS.saturating_sub(new_count),
            });
        }

        // Success resets the counter; a persistence failure here must not
        // fail the login.
        if let Err(e) = self
            .store
            .update_account_security(email, 0, false, None)
            .await
        {
            warn!("Failed to reset attempt count for {}: {}", email, e);
        }

        Ok(CredentialOutcome::Verified(account))
    }

    /// Minutes left on an account's lockout; zero when not locked.
    pub async fn remaining_lockout_minutes(&self, email: &str) -> Result<i64> {
        let account = match self.store.account_by_email(email).await? {
            Some(account) => account,
            None => return Ok(0),
        };

        match (account.is_locked, account.lockout_until_ms) {
            (true, Some(until)) => {
                let remaining = (until - self.clock.now_ms() + 59_999) / 60_000;
                Ok(remaining.max(0))
            }
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::SqliteStore;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const EMAIL: &str = "user@example.com";
    const PASSWORD: &str = "correct-horse";

    async fn setup() -> (CredentialVerifier, Arc<ManualClock>, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = Arc::new(SqliteStore::new(temp_file.path().to_str().unwrap()).unwrap());
        let hash = bcrypt::hash(PASSWORD, 4).unwrap(); // low cost for test speed
        store.insert_account(EMAIL, &hash).await.unwrap();

        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let verifier = CredentialVerifier::new(
            store as Arc<dyn RecordStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (verifier, clock, temp_file)
    }

    #[tokio::test]
    async fn test_correct_password_verifies_and_resets_counter() {
        let (verifier, _clock, _temp) = setup().await;

        // Two failures first.
        for _ in 0..2 {
            verifier.verify(EMAIL, "wrong").await.unwrap();
        }

        let outcome = verifier.verify(EMAIL, PASSWORD).await.unwrap();
        assert!(matches!(outcome, CredentialOutcome::Verified(_)));

        // Counter was reset: a new failure reports 4 remaining again.
        match verifier.verify(EMAIL, "wrong").await.unwrap() {
            CredentialOutcome::Invalid { remaining_attempts } => {
                assert_eq!(remaining_attempts, 4)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_five_failures_lock_with_decreasing_remaining() {
        let (verifier, _clock, _temp) = setup().await;

        for expected in [4u32, 3, 2, 1, 0] {
            match verifier.verify(EMAIL, "wrong").await.unwrap() {
                CredentialOutcome::Invalid { remaining_attempts } => {
                    assert_eq!(remaining_attempts, expected)
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        // Sixth attempt is rejected as locked even with the correct secret.
        match verifier.verify(EMAIL, PASSWORD).await.unwrap() {
            CredentialOutcome::Locked { remaining_minutes } => {
                assert!(remaining_minutes > 0 && remaining_minutes <= 30)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lockout_expires_and_counter_resets() {
        let (verifier, clock, _temp) = setup().await;

        for _ in 0..5 {
            verifier.verify(EMAIL, "wrong").await.unwrap();
        }
        assert!(matches!(
            verifier.verify(EMAIL, PASSWORD).await.unwrap(),
            CredentialOutcome::Locked { .. }
        ));

        clock.advance(Duration::from_millis(LOCKOUT_MS as u64));
        let outcome = verifier.verify(EMAIL, PASSWORD).await.unwrap();
        assert!(matches!(outcome, CredentialOutcome::Verified(_)));

        // Counter restarted from zero after the unlock.
        match verifier.verify(EMAIL, "wrong").await.unwrap() {
            CredentialOutcome::Invalid { remaining_attempts } => {
                assert_eq!(remaining_attempts, 4)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_email_reports_generic_invalid() {
        let (verifier, _clock, _temp) = setup().await;
        match verifier.verify("ghost@example.com", "whatever").await.unwrap() {
            CredentialOutcome::Invalid { .. } => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remaining_lockout_minutes() {
        let (verifier, clock, _temp) = setup().await;
        assert_eq!(verifier.remaining_lockout_minutes(EMAIL).await.unwrap(), 0);

        for _ in 0..5 {
            verifier.verify(EMAIL, "wrong").await.unwrap();
        }
        let minutes = verifier.remaining_lockout_minutes(EMAIL).await.unwrap();
        assert_eq!(minutes, 30);

        clock.advance(Duration::from_secs(10 * 60));
        let minutes = verifier.remaining_lockout_minutes(EMAIL).await.unwrap();
        assert_eq!(minutes, 20);

        assert_eq!(
            verifier
                .remaining_lockout_minutes("ghost@example.com")
                .await
                .unwrap(),
            0
        );
    }
}
