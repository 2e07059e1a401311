//! Session Store
//! Mission: Local-authoritative session state with a best-effort remote mirror
//!
//! The local tier always decides validity. The remote mirror exists for
//! cross-device visibility only: every mirror operation swallows failures,
//! and a mirror disagreement never overrides a valid local result.

use crate::auth::models::{
    SessionCheck, SubjectInfo, INACTIVITY_LIMIT_MS, NORMAL_SESSION_MS, REMEMBER_SESSION_MS,
};
use crate::auth::token::TokenCodec;
use crate::clock::Clock;
use crate::store::{LocalStateStore, RecordStore, SessionRecord};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Local entry names, one per session field.
const KEY_TOKEN: &str = "auth_token";
const KEY_SUBJECT_ID: &str = "user_id";
const KEY_EMAIL: &str = "user_email";
const KEY_REMEMBER: &str = "remember_me";
const KEY_EXPIRES: &str = "session_expires";
const KEY_LAST_ACTIVITY: &str = "last_activity";
const ALL_KEYS: [&str; 6] = [
    KEY_TOKEN,
    KEY_SUBJECT_ID,
    KEY_EMAIL,
    KEY_REMEMBER,
    KEY_EXPIRES,
    KEY_LAST_ACTIVITY,
];

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Best-effort remote copy of the session. Failures are logged, never raised.
#[derive(Clone)]
pub struct SessionMirror {
    store: Arc<dyn RecordStore>,
}

impl SessionMirror {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, session: &SessionRecord) {
        if let Err(e) = self.store.insert_session(session).await {
            warn!("Session mirror write failed (continuing): {}", e);
        }
    }

    pub async fn touch(&self, subject_id: Uuid, last_activity_ms: i64) {
        if let Err(e) = self.store.touch_session(subject_id, last_activity_ms).await {
            warn!("Session mirror touch failed (continuing): {}", e);
        }
    }

    pub async fn deactivate(&self, subject_id: Uuid, logout_time_ms: i64) {
        if let Err(e) = self
            .store
            .deactivate_session(subject_id, logout_time_ms)
            .await
        {
            warn!("Session mirror deactivate failed (continuing): {}", e);
        }
    }

    pub async fn deactivate_all(&self, subject_id: Uuid, logout_time_ms: i64) {
        if let Err(e) = self
            .store
            .deactivate_all_sessions(subject_id, logout_time_ms)
            .await
        {
            warn!("Session mirror deactivate-all failed (continuing): {}", e);
        }
    }

    /// Advisory only: `None` when the mirror is unreachable.
    pub async fn is_active(&self, subject_id: Uuid) -> Option<bool> {
        match self.store.active_session(subject_id).await {
            Ok(session) => Some(session.is_some()),
            Err(e) => {
                warn!("Session mirror check failed (continuing): {}", e);
                None
            }
        }
    }
}

pub struct SessionStore {
    local: Arc<LocalStateStore>,
    mirror: SessionMirror,
    codec: Arc<TokenCodec>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(
        local: Arc<LocalStateStore>,
        mirror: SessionMirror,
        codec: Arc<TokenCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            local,
            mirror,
            codec,
            clock,
        }
    }

    pub fn mirror(&self) -> &SessionMirror {
        &self.mirror
    }

    fn device_descriptor() -> String {
        format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Create a session: local writes are synchronous and unconditional, the
    /// remote mirror is best-effort.
    pub async fn create(
        &self,
        subject_id: Uuid,
        email: &str,
        token: &str,
        remember: bool,
    ) -> Result<SessionRecord> {
        let now = self.clock.now_ms();
        let duration = if remember {
            REMEMBER_SESSION_MS
        } else {
            NORMAL_SESSION_MS
        };
        let expires_at = now + duration;
        let entry_ttl = if remember { 30 * DAY_MS } else { 7 * DAY_MS };

        self.local
            .set(KEY_TOKEN, token, entry_ttl)
            .context("Failed to store session token")?;
        self.local
            .set(KEY_SUBJECT_ID, &subject_id.to_string(), entry_ttl)?;
        self.local.set(KEY_EMAIL, email, entry_ttl)?;
        self.local
            .set(KEY_REMEMBER, if remember { "true" } else { "false" }, entry_ttl)?;
        self.local
            .set(KEY_EXPIRES, &expires_at.to_string(), entry_ttl)?;
        self.local
            .set(KEY_LAST_ACTIVITY, &now.to_string(), DAY_MS)?;

        let session = SessionRecord {
            subject_id,
            email: email.to_string(),
            login_time_ms: now,
            last_activity_ms: now,
            expires_at_ms: expires_at,
            is_active: true,
            remember,
            device: Self::device_descriptor(),
        };
        self.mirror.create(&session).await;

        info!(
            "Session created for {} (remember: {}, expires: {})",
            email, remember, expires_at
        );
        Ok(session)
    }

    /// Validate the local session. On success the last-activity marker is
    /// advanced and the subject returned.
    pub async fn is_valid(&self) -> SessionCheck {
        let (token, subject_id, email) = match (
            self.local.get(KEY_TOKEN),
            self.local.get(KEY_SUBJECT_ID),
            self.local.get(KEY_EMAIL),
        ) {
            (Ok(Some(token)), Ok(Some(id)), Ok(Some(email))) => (token, id, email),
            _ => {
                debug!("Session fields missing locally");
                return SessionCheck::invalid();
            }
        };

        let subject_id = match Uuid::parse_str(&subject_id) {
            Ok(id) => id,
            Err(_) => return SessionCheck::invalid(),
        };

        if self.codec.verify(&token).is_none() {
            debug!("Stored token no longer verifies");
            return SessionCheck::invalid();
        }

        let now = self.clock.now_ms();
        if let Ok(Some(expires)) = self.local.get(KEY_EXPIRES) {
            match expires.parse::<i64>() {
                Ok(expires_at) if now <= expires_at => {}
                _ => {
                    debug!("Session past its absolute expiry");
                    return SessionCheck::invalid();
                }
            }

            let remember = matches!(self.local.get(KEY_REMEMBER), Ok(Some(v)) if v == "true");
            if !remember {
                if let Ok(Some(last)) = self.local.get(KEY_LAST_ACTIVITY) {
                    let last = last.parse::<i64>().unwrap_or(0);
                    if last > 0 && now - last > INACTIVITY_LIMIT_MS {
                        debug!("Session expired through inactivity");
                        return SessionCheck::invalid();
                    }
                }
            }
        }

        // Advisory mirror check. Local stays authoritative.
        if let Some(false) = self.mirror.is_active(subject_id).await {
            warn!("Mirror reports no active session; keeping local result");
        }

        if let Err(e) = self.local.set(KEY_LAST_ACTIVITY, &now.to_string(), DAY_MS) {
            warn!("Failed to advance last-activity marker: {}", e);
        }

        SessionCheck {
            valid: true,
            subject: Some(SubjectInfo {
                id: subject_id,
                email,
            }),
        }
    }

    /// Advance last-activity locally, mirror best-effort.
    pub async fn touch(&self, subject_id: Uuid) {
        let now = self.clock.now_ms();
        if let Err(e) = self.local.set(KEY_LAST_ACTIVITY, &now.to_string(), DAY_MS) {
            warn!("Failed to update local activity: {}", e);
        }
        self.mirror.touch(subject_id, now).await;
    }

    /// Delete all local artifacts unconditionally; best-effort mark the
    /// remote mirror inactive when a subject id is known.
    pub async fn destroy(&self, subject_id: Option<Uuid>) {
        if let Err(e) = self.local.delete_many(&ALL_KEYS) {
            warn!("Failed to clear local session state: {}", e);
        }
        if let Some(id) = subject_id {
            self.mirror.deactivate(id, self.clock.now_ms()).await;
        }
        info!("Local session destroyed");
    }

    /// Subject id from local state, if a session is present.
    pub fn current_subject_id(&self) -> Option<Uuid> {
        self.local
            .get(KEY_SUBJECT_ID)
            .ok()
            .flatten()
            .and_then(|id| Uuid::parse_str(&id).ok())
    }

    /// Stored token from local state, if present.
    pub fn current_token(&self) -> Option<String> {
        self.local.get(KEY_TOKEN).ok().flatten()
    }

    /// Re-issue the stored token when it is close to expiry. Returns true
    /// when a fresh token was stored.
    pub async fn refresh_token_if_needed(&self) -> bool {
        let token = match self.current_token() {
            Some(token) => token,
            None => return false,
        };

        match self.codec.refresh_if_near_expiry(&token, 1) {
            Some(refreshed) if refreshed != token => {
                let remember = matches!(self.local.get(KEY_REMEMBER), Ok(Some(v)) if v == "true");
                let entry_ttl = if remember { 30 * DAY_MS } else { 7 * DAY_MS };
                match self.local.set(KEY_TOKEN, &refreshed, entry_ttl) {
                    Ok(()) => {
                        info!("Session token refreshed");
                        true
                    }
                    Err(e) => {
                        warn!("Failed to store refreshed token: {}", e);
                        false
                    }
                }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{AccountRecord, ConfigRecord, ContentTable, ProjectRecord, SkillRecord, SqliteStore};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Record store whose every operation fails, for best-effort paths.
    struct UnreachableStore;

    #[async_trait]
    impl RecordStore for UnreachableStore {
        async fn account_by_email(&self, _email: &str) -> Result<Option<AccountRecord>> {
            anyhow::bail!("store unreachable")
        }
        async fn update_account_security(
            &self,
            _email: &str,
            _failed_attempts: u32,
            _is_locked: bool,
            _lockout_until_ms: Option<i64>,
        ) -> Result<()> {
            anyhow::bail!("store unreachable")
        }
        async fn insert_account(&self, _email: &str, _hash: &str) -> Result<AccountRecord> {
            anyhow::bail!("store unreachable")
        }
        async fn insert_session(&self, _session: &SessionRecord) -> Result<()> {
            anyhow::bail!("store unreachable")
        }
        async fn touch_session(&self, _subject_id: Uuid, _last_activity_ms: i64) -> Result<()> {
            anyhow::bail!("store unreachable")
        }
        async fn active_session(&self, _subject_id: Uuid) -> Result<Option<SessionRecord>> {
            anyhow::bail!("store unreachable")
        }
        async fn deactivate_session(&self, _subject_id: Uuid, _logout_time_ms: i64) -> Result<()> {
            anyhow::bail!("store unreachable")
        }
        async fn deactivate_all_sessions(
            &self,
            _subject_id: Uuid,
            _logout_time_ms: i64,
        ) -> Result<()> {
            anyhow::bail!("store unreachable")
        }
        async fn active_site_config(&self) -> Result<Vec<ConfigRecord>> {
            anyhow::bail!("store unreachable")
        }
        async fn active_skills(&self) -> Result<Vec<SkillRecord>> {
            anyhow::bail!("store unreachable")
        }
        async fn active_projects(&self) -> Result<Vec<ProjectRecord>> {
            anyhow::bail!("store unreachable")
        }
        async fn latest_content_update(&self, _table: ContentTable) -> Result<Option<String>> {
            anyhow::bail!("store unreachable")
        }
    }

    struct Fixture {
        sessions: SessionStore,
        codec: Arc<TokenCodec>,
        clock: Arc<ManualClock>,
        remote: Arc<SqliteStore>,
        _local_file: NamedTempFile,
        _remote_file: NamedTempFile,
    }

    fn setup() -> Fixture {
        let local_file = NamedTempFile::new().unwrap();
        let remote_file = NamedTempFile::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));

        let local = Arc::new(
            LocalStateStore::new(
                local_file.path().to_str().unwrap(),
                Arc::clone(&clock) as Arc<dyn Clock>,
            )
            .unwrap(),
        );
        let remote = Arc::new(SqliteStore::new(remote_file.path().to_str().unwrap()).unwrap());
        let codec = Arc::new(TokenCodec::new(
            "session-test-secret".to_string(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));

        let sessions = SessionStore::new(
            local,
            SessionMirror::new(Arc::clone(&remote) as Arc<dyn RecordStore>),
            Arc::clone(&codec),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        Fixture {
            sessions,
            codec,
            clock,
            remote,
            _local_file: local_file,
            _remote_file: remote_file,
        }
    }

    fn issue_token(f: &Fixture, subject_id: Uuid, remember: bool) -> String {
        f.codec
            .issue(
                &subject_id.to_string(),
                "admin@example.com",
                remember,
                f.clock.now_ms(),
                TokenCodec::lifetime_hours(remember),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_valid_and_mirrored() {
        let f = setup();
        let subject_id = Uuid::new_v4();
        let token = issue_token(&f, subject_id, false);

        f.sessions
            .create(subject_id, "admin@example.com", &token, false)
            .await
            .unwrap();

        let check = f.sessions.is_valid().await;
        assert!(check.valid);
        assert_eq!(check.subject.unwrap().id, subject_id);

        // Remote mirror carries a copy.
        assert!(f.remote.active_session(subject_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_session_expires_after_eight_hours() {
        let f = setup();
        let subject_id = Uuid::new_v4();
        let token = issue_token(&f, subject_id, false);
        f.sessions
            .create(subject_id, "admin@example.com", &token, false)
            .await
            .unwrap();

        f.clock.advance(Duration::from_secs(8 * 3600 + 1));
        assert!(!f.sessions.is_valid().await.valid);
    }

    #[tokio::test]
    async fn test_inactivity_boundary_for_plain_sessions() {
        let f = setup();
        let subject_id = Uuid::new_v4();
        let token = issue_token(&f, subject_id, false);
        f.sessions
            .create(subject_id, "admin@example.com", &token, false)
            .await
            .unwrap();

        // One second inside the inactivity ceiling: still valid.
        f.clock
            .advance(Duration::from_millis((INACTIVITY_LIMIT_MS - 1_000) as u64));
        assert!(f.sessions.is_valid().await.valid);

        // The successful check advanced last-activity; push past the ceiling
        // from there.
        f.clock
            .advance(Duration::from_millis((INACTIVITY_LIMIT_MS + 1_000) as u64));
        assert!(!f.sessions.is_valid().await.valid);
    }

    #[tokio::test]
    async fn test_remember_sessions_ignore_inactivity() {
        let f = setup();
        let subject_id = Uuid::new_v4();
        let token = issue_token(&f, subject_id, true);
        f.sessions
            .create(subject_id, "admin@example.com", &token, true)
            .await
            .unwrap();

        f.clock.advance(Duration::from_secs(3 * 24 * 3600));
        assert!(f.sessions.is_valid().await.valid);
    }

    #[tokio::test]
    async fn test_destroy_clears_local_and_mirror() {
        let f = setup();
        let subject_id = Uuid::new_v4();
        let token = issue_token(&f, subject_id, false);
        f.sessions
            .create(subject_id, "admin@example.com", &token, false)
            .await
            .unwrap();

        f.sessions.destroy(Some(subject_id)).await;
        assert!(!f.sessions.is_valid().await.valid);
        assert!(f.sessions.current_subject_id().is_none());
        assert!(f.remote.active_session(subject_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_mirror_never_blocks_local_session() {
        let local_file = NamedTempFile::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let local = Arc::new(
            LocalStateStore::new(
                local_file.path().to_str().unwrap(),
                Arc::clone(&clock) as Arc<dyn Clock>,
            )
            .unwrap(),
        );
        let codec = Arc::new(TokenCodec::new(
            "session-test-secret".to_string(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let sessions = SessionStore::new(
            local,
            SessionMirror::new(Arc::new(UnreachableStore) as Arc<dyn RecordStore>),
            Arc::clone(&codec),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        let subject_id = Uuid::new_v4();
        let token = codec
            .issue(&subject_id.to_string(), "admin@example.com", false, clock.now_ms(), 8)
            .unwrap();

        // Create succeeds although every mirror write fails.
        sessions
            .create(subject_id, "admin@example.com", &token, false)
            .await
            .unwrap();
        assert!(sessions.is_valid().await.valid);

        sessions.touch(subject_id).await;
        sessions.destroy(Some(subject_id)).await;
        assert!(!sessions.is_valid().await.valid);
    }

    #[tokio::test]
    async fn test_token_refresh_near_expiry() {
        let f = setup();
        let subject_id = Uuid::new_v4();
        let token = issue_token(&f, subject_id, false);
        f.sessions
            .create(subject_id, "admin@example.com", &token, false)
            .await
            .unwrap();

        // Far from expiry: nothing happens.
        assert!(!f.sessions.refresh_token_if_needed().await);

        f.clock.advance(Duration::from_secs(7 * 3600 + 1800));
        assert!(f.sessions.refresh_token_if_needed().await);
        assert_ne!(f.sessions.current_token().unwrap(), token);
    }
}
