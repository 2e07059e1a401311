//! Content Models
//! Mission: The aggregate portfolio snapshot and its site-copy sections

use crate::store::{ConfigRecord, ProjectRecord, SkillRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalConfig {
    pub name: String,
    pub title: String,
    pub description: String,
    pub email: String,
    pub github: String,
    pub linkedin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AboutConfig {
    pub title: String,
    pub image_url: String,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactConfig {
    pub title: String,
    pub subtitle: String,
    pub primary_button: String,
    pub secondary_button: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhyChooseMeItem {
    pub icon: String,
    pub title: String,
    pub description: String,
    pub gradient: String,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhyChooseMeConfig {
    pub title: String,
    pub subtitle: String,
    pub cta_title: String,
    pub cta_subtitle: String,
    pub cta_primary_button: String,
    pub cta_secondary_button: String,
    pub items: Vec<WhyChooseMeItem>,
}

/// Site copy assembled from the key/value config table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteCopy {
    pub personal: Option<PersonalConfig>,
    pub about: Option<AboutConfig>,
    pub contact: Option<ContactConfig>,
    pub why_choose_me: Option<WhyChooseMeConfig>,
}

/// The aggregate content snapshot served to the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioData {
    pub personal: Option<PersonalConfig>,
    pub about: Option<AboutConfig>,
    pub skills: Vec<SkillRecord>,
    pub projects: Vec<ProjectRecord>,
    pub contact: Option<ContactConfig>,
    pub why_choose_me: Option<WhyChooseMeConfig>,
}

impl PortfolioData {
    /// The personal section is the one the site cannot render without.
    pub fn has_essential(&self) -> bool {
        self.personal.is_some()
    }
}

type SectionMap = HashMap<String, HashMap<String, serde_json::Value>>;

fn by_section(records: Vec<ConfigRecord>) -> SectionMap {
    let mut sections: SectionMap = HashMap::new();
    for record in records {
        let value = match record.data_type.as_str() {
            "json" => serde_json::from_str(&record.value).unwrap_or_else(|e| {
                warn!(
                    "Bad JSON in site config {}/{}: {}",
                    record.section, record.key, e
                );
                serde_json::Value::Null
            }),
            "boolean" => serde_json::Value::Bool(record.value == "true"),
            _ => serde_json::Value::String(record.value),
        };
        sections
            .entry(record.section)
            .or_default()
            .insert(record.key, value);
    }
    sections
}

fn text(section: &HashMap<String, serde_json::Value>, key: &str) -> String {
    section
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn optional_text(section: &HashMap<String, serde_json::Value>, key: &str) -> Option<String> {
    section
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

impl SiteCopy {
    pub fn from_records(records: Vec<ConfigRecord>) -> Self {
        let sections = by_section(records);

        let personal = sections.get("personal").map(|s| PersonalConfig {
            name: text(s, "name"),
            title: text(s, "title"),
            description: text(s, "description"),
            email: text(s, "email"),
            github: text(s, "github"),
            linkedin: text(s, "linkedin"),
            whatsapp: optional_text(s, "whatsapp"),
            telegram: optional_text(s, "telegram"),
        });

        let about = sections.get("about").map(|s| AboutConfig {
            title: text(s, "title"),
            image_url: text(s, "image_url"),
            paragraphs: [text(s, "paragraph_1"), text(s, "paragraph_2")]
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect(),
        });

        let contact = sections.get("contact").map(|s| ContactConfig {
            title: text(s, "title"),
            subtitle: text(s, "subtitle"),
            primary_button: text(s, "primary_button"),
            secondary_button: text(s, "secondary_button"),
        });

        let why_choose_me = sections.get("why_choose_me").map(|s| WhyChooseMeConfig {
            title: text(s, "title"),
            subtitle: text(s, "subtitle"),
            cta_title: text(s, "cta_title"),
            cta_subtitle: text(s, "cta_subtitle"),
            cta_primary_button: text(s, "cta_primary_button"),
            cta_secondary_button: text(s, "cta_secondary_button"),
            items: s
                .get("items")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default(),
        });

        Self {
            personal,
            about,
            contact,
            why_choose_me,
        }
    }
}
