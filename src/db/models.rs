//! Database Models - structs representing the blog tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Status value given to tags and categories created from free-form input
pub const STATUS_ACTIVE: i16 = 1;

/// Publication status of a blog post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum BlogStatus {
    Published,
    #[default]
    Draft,
    InActive,
    Scheduled,
}

impl BlogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlogStatus::Published => "Published",
            BlogStatus::Draft => "Draft",
            BlogStatus::InActive => "InActive",
            BlogStatus::Scheduled => "Scheduled",
        }
    }

    /// Parse a form value, ignoring case and surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "published" => Some(BlogStatus::Published),
            "draft" => Some(BlogStatus::Draft),
            "inactive" => Some(BlogStatus::InActive),
            "scheduled" => Some(BlogStatus::Scheduled),
            _ => None,
        }
    }
}

impl std::str::FromStr for BlogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown blog status `{}`", s.trim()))
    }
}

impl std::fmt::Display for BlogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blog post model
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub content: String,
    pub publish_datetime: DateTime<Utc>,
    pub featured_image: Option<String>,
    pub meta_title: Option<String>,
    pub meta_keywords: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_link: Option<String>,
    pub status: BlogStatus,
    pub created_by: i64,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New blog post for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewBlogPost {
    pub name: String,
    pub slug: String,
    pub content: String,
    pub publish_datetime: DateTime<Utc>,
    pub featured_image: Option<String>,
    pub meta_title: Option<String>,
    pub meta_keywords: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_link: Option<String>,
    pub status: BlogStatus,
    pub created_by: i64,
}

/// Tag or category row
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: i64,
    pub name: String,
    pub status: i16,
    pub created_by: i64,
}

/// New tag or category for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewTerm {
    pub name: String,
    pub status: i16,
    pub created_by: i64,
}

/// Row of the admin blog table: post columns plus the creator's first name
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogListRow {
    pub id: i64,
    pub name: String,
    pub publish_datetime: DateTime<Utc>,
    pub status: BlogStatus,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub user_name: Option<String>,
}
