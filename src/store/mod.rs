//! Record Store
//! Mission: Typed access to the remote table-oriented data service

pub mod local;
pub mod records;
pub mod sqlite;

pub use local::LocalStateStore;
pub use records::{
    AccountRecord, CategoryRecord, ConfigRecord, ProjectRecord, SessionRecord, SkillRecord,
    TechnologyRecord,
};
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Content tables watched by the cache fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTable {
    SiteConfig,
    Skills,
    Projects,
}

/// Table-style operations over the logical tables used by the portfolio.
///
/// Rows cross this boundary as typed records; the mapping from whatever the
/// backing service stores lives entirely inside the implementation.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // -- accounts ------------------------------------------------------------
    async fn account_by_email(&self, email: &str) -> Result<Option<AccountRecord>>;

    /// Persist the lockout bookkeeping for one account.
    async fn update_account_security(
        &self,
        email: &str,
        failed_attempts: u32,
        is_locked: bool,
        lockout_until_ms: Option<i64>,
    ) -> Result<()>;

    async fn insert_account(&self, email: &str, password_hash: &str) -> Result<AccountRecord>;

    // -- sessions (remote mirror) --------------------------------------------
    async fn insert_session(&self, session: &SessionRecord) -> Result<()>;

    async fn touch_session(&self, subject_id: Uuid, last_activity_ms: i64) -> Result<()>;

    async fn active_session(&self, subject_id: Uuid) -> Result<Option<SessionRecord>>;

    /// Mark the active session for one subject inactive.
    async fn deactivate_session(&self, subject_id: Uuid, logout_time_ms: i64) -> Result<()>;

    /// Mark every session for one subject inactive, active or not.
    async fn deactivate_all_sessions(&self, subject_id: Uuid, logout_time_ms: i64) -> Result<()>;

    // -- content -------------------------------------------------------------
    async fn active_site_config(&self) -> Result<Vec<ConfigRecord>>;

    async fn active_skills(&self) -> Result<Vec<SkillRecord>>;

    /// Active projects with their technologies and category joined in,
    /// featured first, then by sort order.
    async fn active_projects(&self) -> Result<Vec<ProjectRecord>>;

    /// Most recent `updated_at` among active rows of one watched table.
    async fn latest_content_update(&self, table: ContentTable) -> Result<Option<String>>;
}
