//! Auth Orchestrator
//! Mission: Compose verifier, codec and sessions into the login lifecycle
//!
//! Publishes observable auth state on a watch channel and owns the two
//! background timers: periodic touch + token refresh while a session exists,
//! and a faster revalidation loop that forces logout once the session dies.

use crate::auth::credentials::CredentialVerifier;
use crate::auth::models::{
    AuthSnapshot, CredentialOutcome, LoginResult, SubjectInfo, MAX_ATTEMPTS,
};
use crate::auth::session::SessionStore;
use crate::auth::token::TokenCodec;
use crate::clock::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Touch + opportunistic token refresh cadence.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Revalidation cadence while authenticated.
const RECHECK_INTERVAL: Duration = Duration::from_secs(2 * 60);

const CONNECTION_ERROR: &str = "Connection error, please try again";
const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Default)]
struct BackgroundTasks {
    maintenance: Option<JoinHandle<()>>,
    recheck: Option<JoinHandle<()>>,
}

pub struct AuthService {
    verifier: CredentialVerifier,
    codec: Arc<TokenCodec>,
    sessions: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
    state: Arc<watch::Sender<AuthSnapshot>>,
    tasks: Mutex<BackgroundTasks>,
}

impl AuthService {
    pub fn new(
        verifier: CredentialVerifier,
        codec: Arc<TokenCodec>,
        sessions: Arc<SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tx, _rx) = watch::channel(AuthSnapshot::default());
        Self {
            verifier,
            codec,
            sessions,
            clock,
            state: Arc::new(tx),
            tasks: Mutex::new(BackgroundTasks::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    fn publish(&self, snapshot: AuthSnapshot) {
        self.state.send_replace(snapshot);
    }

    fn publish_failure(&self, error: String, is_locked: bool, remaining_attempts: u32) {
        self.publish(AuthSnapshot {
            is_authenticated: false,
            subject: None,
            is_loading: false,
            error: Some(error),
            is_locked,
            remaining_attempts,
        });
    }

    /// Authenticate and establish a session. Fails closed: transport errors
    /// surface as a generic connection error, never as internals.
    pub async fn login(&self, email: &str, password: &str, remember: bool) -> LoginResult {
        info!("Login attempt: {}", email);
        self.publish(AuthSnapshot {
            is_loading: true,
            ..self.snapshot()
        });

        let outcome = match self.verifier.verify(email, password).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Login failed on transport: {}", e);
                self.publish_failure(CONNECTION_ERROR.to_string(), false, MAX_ATTEMPTS);
                return LoginResult::failure(CONNECTION_ERROR);
            }
        };

        match outcome {
            CredentialOutcome::Locked { remaining_minutes } => {
                warn!("Login rejected, account locked: {}", email);
                let message =
                    format!("Account locked. Try again in {remaining_minutes} minutes.");
                self.publish_failure(message.clone(), true, 0);
                LoginResult {
                    success: false,
                    token: None,
                    subject: None,
                    error: Some(message),
                    is_locked: true,
                    remaining_attempts: Some(0),
                }
            }
            CredentialOutcome::Invalid { remaining_attempts } => {
                warn!("Failed login attempt: {}", email);
                let message = if remaining_attempts > 0 {
                    format!("{INVALID_CREDENTIALS}. {remaining_attempts} attempts remaining.")
                } else {
                    "Account locked after too many failed attempts.".to_string()
                };
                self.publish_failure(message.clone(), remaining_attempts == 0, remaining_attempts);
                LoginResult {
                    success: false,
                    token: None,
                    subject: None,
                    error: Some(message),
                    is_locked: remaining_attempts == 0,
                    remaining_attempts: Some(remaining_attempts),
                }
            }
            CredentialOutcome::Verified(account) => {
                let token = match self.codec.issue(
                    &account.id.to_string(),
                    &account.email,
                    remember,
                    self.clock.now_ms(),
                    TokenCodec::lifetime_hours(remember),
                ) {
                    Ok(token) => token,
                    Err(e) => {
                        error!("Token issue failed: {}", e);
                        self.publish_failure(CONNECTION_ERROR.to_string(), false, MAX_ATTEMPTS);
                        return LoginResult::failure(CONNECTION_ERROR);
                    }
                };

                if let Err(e) = self
                    .sessions
                    .create(account.id, &account.email, &token, remember)
                    .await
                {
                    error!("Session create failed: {}", e);
                    self.publish_failure(CONNECTION_ERROR.to_string(), false, MAX_ATTEMPTS);
                    return LoginResult::failure(CONNECTION_ERROR);
                }

                let subject = SubjectInfo {
                    id: account.id,
                    email: account.email.clone(),
                };
                self.publish(AuthSnapshot {
                    is_authenticated: true,
                    subject: Some(subject.clone()),
                    is_loading: false,
                    error: None,
                    is_locked: false,
                    remaining_attempts: MAX_ATTEMPTS,
                });
                self.start_background();

                info!("Login successful: {}", email);
                LoginResult {
                    success: true,
                    token: Some(token),
                    subject: Some(subject),
                    error: None,
                    is_locked: false,
                    remaining_attempts: None,
                }
            }
        }
    }

    /// Destroy the current session and reset state.
    pub async fn logout(&self) {
        let subject_id = self.sessions.current_subject_id();
        self.sessions.destroy(subject_id).await;
        self.stop_background();
        self.publish(AuthSnapshot {
            is_loading: false,
            ..AuthSnapshot::default()
        });
        info!("Logout completed");
    }

    /// Logout everywhere: best-effort deactivate every remote mirror for the
    /// subject, then the normal local logout.
    pub async fn logout_all_devices(&self) {
        if let Some(subject_id) = self.sessions.current_subject_id() {
            self.sessions
                .mirror()
                .deactivate_all(subject_id, self.clock.now_ms())
                .await;
        }
        self.logout().await;
        info!("Logout from all devices completed");
    }

    /// Restore a previously established session, if one is still valid.
    pub async fn check_existing_session(&self) -> bool {
        let check = self.sessions.is_valid().await;

        if check.valid {
            self.publish(AuthSnapshot {
                is_authenticated: true,
                subject: check.subject,
                is_loading: false,
                error: None,
                is_locked: false,
                remaining_attempts: MAX_ATTEMPTS,
            });
            self.start_background();
            info!("Existing session restored");
            return true;
        }

        // Clear any stale local artifacts before reporting unauthenticated.
        self.sessions.destroy(None).await;
        self.publish(AuthSnapshot {
            is_loading: false,
            ..AuthSnapshot::default()
        });
        false
    }

    /// Minutes left on an account's lockout; zero on any failure.
    pub async fn remaining_lockout_minutes(&self, email: &str) -> i64 {
        self.verifier
            .remaining_lockout_minutes(email)
            .await
            .unwrap_or(0)
    }

    /// One maintenance pass: revalidate first; only a session that still
    /// holds up gets its activity touched and its token refreshed.
    async fn maintenance_tick(sessions: &SessionStore) {
        if !sessions.is_valid().await.valid {
            return;
        }
        if let Some(subject_id) = sessions.current_subject_id() {
            sessions.touch(subject_id).await;
        }
        sessions.refresh_token_if_needed().await;
    }

    fn start_background(&self) {
        let mut tasks = self.tasks.lock();

        if tasks.maintenance.is_none() {
            let sessions = Arc::clone(&self.sessions);
            tasks.maintenance = Some(tokio::spawn(async move {
                let mut ticker = interval(MAINTENANCE_INTERVAL);
                ticker.tick().await; // first tick is immediate
                loop {
                    ticker.tick().await;
                    Self::maintenance_tick(&sessions).await;
                }
            }));
        }

        if tasks.recheck.is_none() {
            let sessions = Arc::clone(&self.sessions);
            let state = Arc::clone(&self.state);
            tasks.recheck = Some(tokio::spawn(async move {
                let mut ticker = interval(RECHECK_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if !state.borrow().is_authenticated {
                        continue;
                    }
                    let check = sessions.is_valid().await;
                    if !check.valid {
                        warn!("Session no longer valid, forcing logout");
                        let subject_id = sessions.current_subject_id();
                        sessions.destroy(subject_id).await;
                        state.send_replace(AuthSnapshot {
                            is_loading: false,
                            ..AuthSnapshot::default()
                        });
                    }
                }
            }));
        }
    }

    fn stop_background(&self) {
        let mut tasks = self.tasks.lock();
        if let Some(handle) = tasks.maintenance.take() {
            handle.abort();
        }
        if let Some(handle) = tasks.recheck.take() {
            handle.abort();
        }
    }
}

impl Drop for AuthService {
    fn drop(&mut self) {
        self.stop_background();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::SessionMirror;
    use crate::clock::ManualClock;
    use crate::store::{LocalStateStore, RecordStore, SqliteStore};
    use tempfile::TempDir;

    const EMAIL: &str = "admin@example.com";
    const PASSWORD: &str = "hunter2hunter2";

    struct Fixture {
        service: AuthService,
        clock: Arc<ManualClock>,
        dir: TempDir,
    }

    async fn setup() -> Fixture {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));

        let remote_path = dir.path().join("remote.db");
        let local_path = dir.path().join("local.db");

        let remote = Arc::new(SqliteStore::new(remote_path.to_str().unwrap()).unwrap());
        let hash = bcrypt::hash(PASSWORD, 4).unwrap();
        remote.insert_account(EMAIL, &hash).await.unwrap();

        let local = Arc::new(
            LocalStateStore::new(
                local_path.to_str().unwrap(),
                Arc::clone(&clock) as Arc<dyn Clock>,
            )
            .unwrap(),
        );
        let codec = Arc::new(TokenCodec::new(
            "service-test-secret".to_string(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let store: Arc<dyn RecordStore> = remote;

        let sessions = Arc::new(SessionStore::new(
            local,
            SessionMirror::new(Arc::clone(&store)),
            Arc::clone(&codec),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let verifier =
            CredentialVerifier::new(Arc::clone(&store), Arc::clone(&clock) as Arc<dyn Clock>);

        let service = AuthService::new(
            verifier,
            codec,
            sessions,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Fixture {
            service,
            clock,
            dir,
        }
    }

    #[tokio::test]
    async fn test_successful_login_publishes_authenticated_state() {
        let f = setup().await;

        let result = f.service.login(EMAIL, PASSWORD, false).await;
        assert!(result.success);
        assert!(result.token.is_some());
        assert_eq!(result.subject.unwrap().email, EMAIL);

        let snapshot = f.service.snapshot();
        assert!(snapshot.is_authenticated);
        assert!(!snapshot.is_loading);
        assert!(snapshot.error.is_none());

        f.service.logout().await;
    }

    #[tokio::test]
    async fn test_failed_login_reports_remaining_attempts() {
        let f = setup().await;

        let result = f.service.login(EMAIL, "wrong-password", false).await;
        assert!(!result.success);
        assert_eq!(result.remaining_attempts, Some(4));
        assert!(result.error.unwrap().contains("Invalid email or password"));

        let snapshot = f.service.snapshot();
        assert!(!snapshot.is_authenticated);
        assert_eq!(snapshot.remaining_attempts, 4);
    }

    #[tokio::test]
    async fn test_locked_account_rejects_correct_password() {
        let f = setup().await;

        for _ in 0..5 {
            f.service.login(EMAIL, "wrong-password", false).await;
        }

        let result = f.service.login(EMAIL, PASSWORD, false).await;
        assert!(!result.success);
        assert!(result.is_locked);

        let minutes = f.service.remaining_lockout_minutes(EMAIL).await;
        assert!(minutes > 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_a_generic_connection_error() {
        let f = setup().await;

        // Take the record store away entirely.
        std::fs::remove_dir_all(f.dir.path()).unwrap();

        let result = f.service.login(EMAIL, PASSWORD, false).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(CONNECTION_ERROR));
    }

    #[tokio::test]
    async fn test_logout_resets_state_and_session() {
        let f = setup().await;
        f.service.login(EMAIL, PASSWORD, false).await;
        assert!(f.service.snapshot().is_authenticated);

        f.service.logout().await;
        assert!(!f.service.snapshot().is_authenticated);
        assert!(!f.service.check_existing_session().await);
    }

    #[tokio::test]
    async fn test_existing_session_restored_until_expiry() {
        let f = setup().await;
        f.service.login(EMAIL, PASSWORD, false).await;
        f.service.stop_background();

        // Fresh check within the window restores the session.
        assert!(f.service.check_existing_session().await);

        // Past the 8-hour window the session is gone.
        f.clock
            .advance(std::time::Duration::from_secs(8 * 3600 + 1));
        assert!(!f.service.check_existing_session().await);
    }

    #[tokio::test]
    async fn test_maintenance_tick_validates_before_touching() {
        let f = setup().await;
        let result = f.service.login(EMAIL, PASSWORD, false).await;
        let subject_id = result.subject.unwrap().id;
        f.service.stop_background();

        let original = f.service.sessions.current_token().unwrap();

        // Hourly ticks keep a plain session past the 2-hour inactivity
        // window, and the token is reissued once under an hour remains.
        for _ in 0..7 {
            f.clock.advance(std::time::Duration::from_secs(3600));
            AuthService::maintenance_tick(&f.service.sessions).await;
        }
        f.clock.advance(std::time::Duration::from_secs(1800));
        AuthService::maintenance_tick(&f.service.sessions).await;
        assert_ne!(f.service.sessions.current_token().unwrap(), original);
        assert!(f.service.sessions.is_valid().await.valid);

        // Past the absolute window the tick leaves everything alone: no
        // activity advance reaches the mirror, no token reissue.
        f.clock.advance(std::time::Duration::from_secs(9 * 3600));
        let remote = SqliteStore::new(f.dir.path().join("remote.db").to_str().unwrap()).unwrap();
        let before = remote
            .active_session(subject_id)
            .await
            .unwrap()
            .unwrap()
            .last_activity_ms;
        let refreshed = f.service.sessions.current_token().unwrap();

        AuthService::maintenance_tick(&f.service.sessions).await;

        let after = remote
            .active_session(subject_id)
            .await
            .unwrap()
            .unwrap()
            .last_activity_ms;
        assert_eq!(after, before);
        assert_eq!(f.service.sessions.current_token().unwrap(), refreshed);
    }
}
