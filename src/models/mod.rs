use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Submissions ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub occupation: Option<String>,
    pub story: String,
    pub additional_notes: Option<String>,
    pub consent_version: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of the public submission form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSubmission {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    pub story: String,
    #[serde(default)]
    pub additional_notes: Option<String>,
    #[serde(default)]
    pub consent: bool,
}

// --- Catalog entities ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagDraft {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub storyteller: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub video_url: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoryDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub storyteller: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub story_id: String,
    pub title: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Organisation {
    pub id: String,
    pub name: String,
    pub description: String,
    pub website: String,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganisationDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalAdvisor {
    pub id: String,
    pub name: String,
    pub title: String,
    pub bio: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvisorDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

// --- Blog ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogMetadata {
    pub title: String,
    pub author: String,
    pub summary: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlogPost {
    pub id: String,
    pub metadata: BlogMetadata,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlogSummary {
    pub id: String,
    pub metadata: BlogMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlogPostDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

// --- Accounts, media, dashboard ---

#[derive(Debug, Clone, Serialize)]
pub struct AdminUser {
    pub id: i32,
    pub username: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedImage {
    pub id: String,
    pub url: String,
    pub file_format: String,
    pub original_filename: String,
    pub file_size: i64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub message: String,
    pub r#type: String, // 'success' or 'error'
}

pub mod confirmation;
pub mod db_operations;
pub mod inline_editor;
