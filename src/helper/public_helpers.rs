use crate::helper::sanitization_helpers::{render_markdown, strip_all_html, strip_optional};
use crate::models::db_operations::{blog_db_operations, catalog_db_operations, submissions_db_operations, DbError};
use crate::models::{BlogPost, BlogSummary, GlobalAdvisor, MapMarker, NewSubmission, Organisation, Story, Tag};
use crate::DbPool;
use redb::Database;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("{0} is required.")]
    MissingField(&'static str),
    #[error("Consent to the current policy is required.")]
    ConsentRequired,
    #[error("Backend error: {0}")]
    Backend(#[from] DbError),
}

pub fn fetch_stories(pool: &DbPool, tag: Option<&str>) -> Result<Vec<Story>, DbError> {
    let conn = pool.get()?;
    match tag.map(str::trim).filter(|t| !t.is_empty()) {
        Some(tag_id) => catalog_db_operations::read_stories_by_tag(&conn, tag_id),
        None => catalog_db_operations::read_all_stories(&conn),
    }
}

pub fn fetch_story(pool: &DbPool, id: &str) -> Result<Option<Story>, DbError> {
    catalog_db_operations::read_story(&*pool.get()?, id)
}

pub fn fetch_map_markers(pool: &DbPool) -> Result<Vec<MapMarker>, DbError> {
    catalog_db_operations::read_map_markers(&*pool.get()?)
}

pub fn fetch_tags(pool: &DbPool) -> Result<Vec<Tag>, DbError> {
    catalog_db_operations::read_all_tags(&*pool.get()?)
}

pub fn fetch_organisations(pool: &DbPool) -> Result<Vec<Organisation>, DbError> {
    catalog_db_operations::read_all_organisations(&*pool.get()?)
}

pub fn fetch_advisors(pool: &DbPool) -> Result<Vec<GlobalAdvisor>, DbError> {
    catalog_db_operations::read_all_advisors(&*pool.get()?)
}

pub fn fetch_latest_blog_posts(db: &Database, limit: u32, offset: u32) -> Result<Vec<BlogSummary>, DbError> {
    blog_db_operations::read_latest_blog_summaries(db, limit, offset)
}

/// A blog post together with its markdown rendered for readers.
#[derive(Debug, Serialize)]
pub struct RenderedBlogPost {
    #[serde(flatten)]
    pub post: BlogPost,
    pub html: String,
}

pub fn fetch_blog_post(db: &Database, id: &str) -> Result<Option<RenderedBlogPost>, DbError> {
    Ok(blog_db_operations::read_blog_post(db, id)?.map(|post| RenderedBlogPost {
        html: render_markdown(&post.content),
        post,
    }))
}

/// Stores a story sent in through the public form, stamped with the consent
/// policy version in force. New submissions always start pending.
pub fn submit_story(pool: &DbPool, form: NewSubmission, consent_version: &str) -> Result<String, SubmissionError> {
    let clean = NewSubmission {
        name: strip_all_html(form.name.trim()),
        email: strip_all_html(form.email.trim()),
        phone: strip_optional(form.phone.as_deref()),
        location: strip_optional(form.location.as_deref()),
        occupation: strip_optional(form.occupation.as_deref()),
        story: strip_all_html(form.story.trim()),
        additional_notes: strip_optional(form.additional_notes.as_deref()),
        consent: form.consent,
    };

    for (label, value) in [("Name", &clean.name), ("Email", &clean.email), ("Story", &clean.story)] {
        if value.is_empty() {
            return Err(SubmissionError::MissingField(label));
        }
    }
    if !clean.consent {
        return Err(SubmissionError::ConsentRequired);
    }

    let conn = pool.get().map_err(DbError::from)?;
    let id = submissions_db_operations::create_submission(&conn, &clean, consent_version)?;
    log::info!("New story submission {} received under consent policy {}", id, consent_version);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::content_pool;

    fn form() -> NewSubmission {
        NewSubmission {
            name: "Tomas".to_string(),
            email: "tomas@example.org".to_string(),
            story: "<p>The harvest moved a month earlier.</p>".to_string(),
            consent: true,
            ..Default::default()
        }
    }

    #[test]
    fn submissions_are_cleaned_stamped_and_pending() {
        let pool = content_pool();
        let id = submit_story(&pool, form(), "2025-03").unwrap();

        let conn = pool.get().unwrap();
        let stored = submissions_db_operations::read_submission(&conn, &id).unwrap().unwrap();
        assert_eq!(stored.story, "The harvest moved a month earlier.");
        assert_eq!(stored.consent_version, "2025-03");
        assert!(!stored.approved);
    }

    #[test]
    fn missing_fields_and_consent_are_rejected() {
        let pool = content_pool();

        let mut no_story = form();
        no_story.story = "   ".to_string();
        assert!(matches!(submit_story(&pool, no_story, "v"), Err(SubmissionError::MissingField("Story"))));

        let mut no_consent = form();
        no_consent.consent = false;
        assert!(matches!(submit_story(&pool, no_consent, "v"), Err(SubmissionError::ConsentRequired)));

        let conn = pool.get().unwrap();
        assert!(submissions_db_operations::read_all_submissions(&conn).unwrap().is_empty());
    }

    #[test]
    fn blank_tag_filter_lists_everything() {
        let pool = content_pool();
        {
            let mut conn = pool.get().unwrap();
            catalog_db_operations::create_story(
                &mut conn,
                &crate::models::StoryDraft { title: "Reefs".to_string(), ..Default::default() },
            )
            .unwrap();
        }
        assert_eq!(fetch_stories(&pool, Some("  ")).unwrap().len(), 1);
        assert!(fetch_stories(&pool, Some("unknown-tag")).unwrap().is_empty());
    }
}
