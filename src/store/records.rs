//! Record Types
//! Mission: One typed struct per logical table at the store boundary

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Admin account row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub failed_attempts: u32,
    pub is_locked: bool,
    pub lockout_until_ms: Option<i64>,
    pub created_at: String,
}

/// One device's session as mirrored to the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub subject_id: Uuid,
    pub email: String,
    pub login_time_ms: i64,
    pub last_activity_ms: i64,
    pub expires_at_ms: i64,
    pub is_active: bool,
    pub remember: bool,
    pub device: String,
}

/// Site copy row: one (section, key, value) triple with a type tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub section: String,
    pub key: String,
    pub value: String,
    pub data_type: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color_gradient: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologyRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub icon: String,
    pub color_gradient: String,
    pub hover_color: String,
}

/// Project row with technologies and category already joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub status_color: String,
    pub image_emoji: Option<String>,
    pub image_url: Option<String>,
    pub github_url: Option<String>,
    pub demo_url: Option<String>,
    pub is_featured: bool,
    pub sort_order: i64,
    pub technologies: Vec<TechnologyRecord>,
    pub category: Option<CategoryRecord>,
}
