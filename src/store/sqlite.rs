//! SQLite Record Store
//! Mission: Default backing for the record store behind the typed boundary

use crate::store::{
    AccountRecord, CategoryRecord, ConfigRecord, ContentTable, ProjectRecord, RecordStore,
    SessionRecord, SkillRecord, TechnologyRecord,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

/// Record store backed by SQLite, connections opened per call.
pub struct SqliteStore {
    db_path: String,
}

fn parse_uuid(s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl SqliteStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("Failed to open record store database")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                failed_attempts INTEGER NOT NULL DEFAULT 0,
                is_locked INTEGER NOT NULL DEFAULT 0,
                lockout_until INTEGER,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id TEXT NOT NULL,
                email TEXT NOT NULL,
                login_time INTEGER NOT NULL,
                last_activity INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                remember INTEGER NOT NULL DEFAULT 0,
                device TEXT NOT NULL,
                logout_time INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS site_config (
                section TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                data_type TEXT NOT NULL DEFAULT 'text',
                is_active INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (section, key)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS skills (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                icon TEXT NOT NULL DEFAULT '',
                color_gradient TEXT NOT NULL DEFAULT '',
                sort_order INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS technologies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                display_name TEXT NOT NULL DEFAULT '',
                icon TEXT NOT NULL DEFAULT '',
                color_gradient TEXT NOT NULL DEFAULT '',
                hover_color TEXT NOT NULL DEFAULT ''
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT '',
                status_color TEXT NOT NULL DEFAULT '',
                image_emoji TEXT,
                image_url TEXT,
                github_url TEXT,
                demo_url TEXT,
                is_featured INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                category_id INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (category_id) REFERENCES categories(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS project_technologies (
                project_id INTEGER NOT NULL,
                technology_id INTEGER NOT NULL,
                PRIMARY KEY (project_id, technology_id),
                FOREIGN KEY (project_id) REFERENCES projects(id),
                FOREIGN KEY (technology_id) REFERENCES technologies(id)
            )",
            [],
        )?;

        Ok(())
    }

    fn account_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountRecord> {
        Ok(AccountRecord {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            failed_attempts: row.get(3)?,
            is_locked: row.get(4)?,
            lockout_until_ms: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    // -- content authoring helpers (admin tooling and tests) -----------------

    pub fn upsert_config(
        &self,
        section: &str,
        key: &str,
        value: &str,
        data_type: &str,
        updated_at: &str,
    ) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO site_config (section, key, value, data_type, is_active, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)
             ON CONFLICT (section, key) DO UPDATE
             SET value = ?3, data_type = ?4, is_active = 1, updated_at = ?5",
            params![section, key, value, data_type, updated_at],
        )?;
        Ok(())
    }

    pub fn insert_skill(&self, skill: &SkillRecord, updated_at: &str) -> Result<i64> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO skills (name, description, icon, color_gradient, sort_order, is_active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![
                skill.name,
                skill.description,
                skill.icon,
                skill.color_gradient,
                skill.sort_order,
                updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_category(&self, category: &CategoryRecord) -> Result<i64> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO categories (name, display_name, icon, color_gradient, hover_color)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                category.name,
                category.display_name,
                category.icon,
                category.color_gradient,
                category.hover_color,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_technology(&self, name: &str) -> Result<i64> {
        let conn = self.open()?;
        conn.execute("INSERT INTO technologies (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_project(
        &self,
        project: &ProjectRecord,
        category_id: Option<i64>,
        updated_at: &str,
    ) -> Result<i64> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO projects (title, description, status, status_color, image_emoji,
                                   image_url, github_url, demo_url, is_featured, sort_order,
                                   category_id, is_active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12)",
            params![
                project.title,
                project.description,
                project.status,
                project.status_color,
                project.image_emoji,
                project.image_url,
                project.github_url,
                project.demo_url,
                project.is_featured,
                project.sort_order,
                category_id,
                updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn link_project_technology(&self, project_id: i64, technology_id: i64) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO project_technologies (project_id, technology_id) VALUES (?1, ?2)",
            params![project_id, technology_id],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn account_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let conn = self.open()?;
        let account = conn
            .query_row(
                "SELECT id, email, password_hash, failed_attempts, is_locked, lockout_until, created_at
                 FROM accounts WHERE email = ?1",
                params![email],
                Self::account_row,
            )
            .optional()
            .context("Failed to query account")?;
        Ok(account)
    }

    async fn update_account_security(
        &self,
        email: &str,
        failed_attempts: u32,
        is_locked: bool,
        lockout_until_ms: Option<i64>,
    ) -> Result<()> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE accounts SET failed_attempts = ?1, is_locked = ?2, lockout_until = ?3
             WHERE email = ?4",
            params![failed_attempts, is_locked, lockout_until_ms, email],
        )?;
        if updated == 0 {
            anyhow::bail!("No account for {email}");
        }
        Ok(())
    }

    async fn insert_account(&self, email: &str, password_hash: &str) -> Result<AccountRecord> {
        let account = AccountRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            failed_attempts: 0,
            is_locked: false,
            lockout_until_ms: None,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO accounts (id, email, password_hash, failed_attempts, is_locked, lockout_until, created_at)
             VALUES (?1, ?2, ?3, 0, 0, NULL, ?4)",
            params![
                account.id.to_string(),
                account.email,
                account.password_hash,
                account.created_at,
            ],
        )
        .context("Failed to insert account")?;

        info!("Created account: {}", account.email);
        Ok(account)
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO sessions (subject_id, email, login_time, last_activity, expires_at,
                                   is_active, remember, device)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session.subject_id.to_string(),
                session.email,
                session.login_time_ms,
                session.last_activity_ms,
                session.expires_at_ms,
                session.is_active,
                session.remember,
                session.device,
            ],
        )
        .context("Failed to insert session")?;
        Ok(())
    }

    async fn touch_session(&self, subject_id: Uuid, last_activity_ms: i64) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE sessions SET last_activity = ?1 WHERE subject_id = ?2 AND is_active = 1",
            params![last_activity_ms, subject_id.to_string()],
        )?;
        Ok(())
    }

    async fn active_session(&self, subject_id: Uuid) -> Result<Option<SessionRecord>> {
        let conn = self.open()?;
        let session = conn
            .query_row(
                "SELECT subject_id, email, login_time, last_activity, expires_at, is_active,
                        remember, device
                 FROM sessions WHERE subject_id = ?1 AND is_active = 1
                 ORDER BY login_time DESC LIMIT 1",
                params![subject_id.to_string()],
                |row| {
                    Ok(SessionRecord {
                        subject_id: parse_uuid(&row.get::<_, String>(0)?)?,
                        email: row.get(1)?,
                        login_time_ms: row.get(2)?,
                        last_activity_ms: row.get(3)?,
                        expires_at_ms: row.get(4)?,
                        is_active: row.get(5)?,
                        remember: row.get(6)?,
                        device: row.get(7)?,
                    })
                },
            )
            .optional()
            .context("Failed to query session")?;
        Ok(session)
    }

    async fn deactivate_session(&self, subject_id: Uuid, logout_time_ms: i64) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE sessions SET is_active = 0, logout_time = ?1
             WHERE subject_id = ?2 AND is_active = 1",
            params![logout_time_ms, subject_id.to_string()],
        )?;
        Ok(())
    }

    async fn deactivate_all_sessions(&self, subject_id: Uuid, logout_time_ms: i64) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE sessions SET is_active = 0, logout_time = ?1 WHERE subject_id = ?2",
            params![logout_time_ms, subject_id.to_string()],
        )?;
        Ok(())
    }

    async fn active_site_config(&self) -> Result<Vec<ConfigRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT section, key, value, data_type, updated_at
             FROM site_config WHERE is_active = 1",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ConfigRecord {
                    section: row.get(0)?,
                    key: row.get(1)?,
                    value: row.get(2)?,
                    data_type: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn active_skills(&self) -> Result<Vec<SkillRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, icon, color_gradient, sort_order
             FROM skills WHERE is_active = 1 ORDER BY sort_order ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SkillRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    icon: row.get(3)?,
                    color_gradient: row.get(4)?,
                    sort_order: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn active_projects(&self) -> Result<Vec<ProjectRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.description, p.status, p.status_color, p.image_emoji,
                    p.image_url, p.github_url, p.demo_url, p.is_featured, p.sort_order,
                    c.id, c.name, c.display_name, c.icon, c.color_gradient, c.hover_color
             FROM projects p
             LEFT JOIN categories c ON c.id = p.category_id
             WHERE p.is_active = 1
             ORDER BY p.is_featured DESC, p.sort_order ASC",
        )?;

        let mut projects = stmt
            .query_map([], |row| {
                let category = match row.get::<_, Option<i64>>(11)? {
                    Some(id) => Some(CategoryRecord {
                        id,
                        name: row.get(12)?,
                        display_name: row.get(13)?,
                        icon: row.get(14)?,
                        color_gradient: row.get(15)?,
                        hover_color: row.get(16)?,
                    }),
                    None => None,
                };
                Ok(ProjectRecord {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    status: row.get(3)?,
                    status_color: row.get(4)?,
                    image_emoji: row.get(5)?,
                    image_url: row.get(6)?,
                    github_url: row.get(7)?,
                    demo_url: row.get(8)?,
                    is_featured: row.get(9)?,
                    sort_order: row.get(10)?,
                    technologies: Vec::new(),
                    category,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tech_stmt = conn.prepare(
            "SELECT t.id, t.name FROM technologies t
             JOIN project_technologies pt ON pt.technology_id = t.id
             WHERE pt.project_id = ?1 ORDER BY t.name ASC",
        )?;
        for project in &mut projects {
            project.technologies = tech_stmt
                .query_map(params![project.id], |row| {
                    Ok(TechnologyRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
        }

        Ok(projects)
    }

    async fn latest_content_update(&self, table: ContentTable) -> Result<Option<String>> {
        let sql = match table {
            ContentTable::SiteConfig => {
                "SELECT updated_at FROM site_config WHERE is_active = 1
                 ORDER BY updated_at DESC LIMIT 1"
            }
            ContentTable::Skills => {
                "SELECT updated_at FROM skills WHERE is_active = 1
                 ORDER BY updated_at DESC LIMIT 1"
            }
            ContentTable::Projects => {
                "SELECT updated_at FROM projects WHERE is_active = 1
                 ORDER BY updated_at DESC LIMIT 1"
            }
        };

        let conn = self.open()?;
        let updated_at = conn
            .query_row(sql, [], |row| row.get::<_, String>(0))
            .optional()
            .context("Failed to query latest content update")?;
        Ok(updated_at)
    }
}
