//! Save/delete flow shared by every inline-edited listing (tags, stories,
//! organisations, advisors, blog posts).

use crate::helper::sanitization_helpers::{sanitize_markdown_content, strip_all_html, strip_optional};
use crate::models::db_operations::DbError;
use crate::models::inline_editor::{DeletePress, EditingTarget, InlineEditorState};
use crate::models::{AdvisorDraft, BlogPostDraft, OrganisationDraft, StoryDraft, TagDraft};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("{0} is required.")]
    MissingField(&'static str),
    #[error("Nothing is being edited. Start a new entry or pick a row first.")]
    NotEditing,
    #[error("Unknown tag ids: {}", .0.join(", "))]
    UnknownTags(Vec<String>),
    #[error("Backend error: {0}")]
    Backend(#[from] DbError),
}

impl EditorError {
    pub fn is_validation(&self) -> bool {
        !matches!(self, EditorError::Backend(_))
    }
}

pub trait EntityDraft {
    /// Label and value of the field that must not be blank.
    fn required_field(&self) -> (&'static str, &str);
    fn sanitized(self) -> Self;
}

/// List/create/update/delete calls for one kind of entity.
pub trait EntityStore {
    type Record: Serialize;
    type Draft: EntityDraft + DeserializeOwned;

    /// Path segment and session key suffix for this listing.
    const KIND: &'static str;

    fn list(&self) -> Result<Vec<Self::Record>, DbError>;
    fn create(&self, draft: &Self::Draft) -> Result<String, DbError>;
    fn update(&self, id: &str, draft: &Self::Draft) -> Result<(), DbError>;
    fn delete(&self, id: &str) -> Result<(), DbError>;

    /// Checks that need storage, run after the required-field check.
    fn validate(&self, _draft: &Self::Draft) -> Result<(), EditorError> {
        Ok(())
    }
}

/// Validates the draft, creates or updates it depending on the editing
/// target, clears the target and returns the reloaded listing.
///
/// A failed write leaves the target in place so the operator can fix the
/// form and save again.
pub fn save_entity<S: EntityStore + ?Sized>(
    store: &S,
    state: &mut InlineEditorState,
    draft: S::Draft,
) -> Result<Vec<S::Record>, EditorError> {
    let target = state.editing.clone().ok_or(EditorError::NotEditing)?;
    let draft = draft.sanitized();

    let (field, value) = draft.required_field();
    if value.trim().is_empty() {
        return Err(EditorError::MissingField(field));
    }
    store.validate(&draft)?;

    match &target {
        EditingTarget::New => {
            let id = store.create(&draft)?;
            log::info!("Created {} entry {}", S::KIND, id);
        }
        EditingTarget::Existing(id) => {
            store.update(id, &draft)?;
            log::info!("Updated {} entry {}", S::KIND, id);
        }
    }
    state.finish_save();
    Ok(store.list()?)
}

#[derive(Debug)]
pub enum DeleteOutcome<R> {
    Armed { id: String },
    Deleted { id: String, records: Vec<R> },
}

/// First press arms `id`; a second press on the same id deletes it and
/// returns the reloaded listing.
pub fn press_delete<S: EntityStore + ?Sized>(
    store: &S,
    state: &mut InlineEditorState,
    id: &str,
) -> Result<DeleteOutcome<S::Record>, EditorError> {
    match state.press_delete(id) {
        DeletePress::Armed => Ok(DeleteOutcome::Armed { id: id.to_string() }),
        DeletePress::Confirmed => {
            store.delete(id)?;
            log::info!("Deleted {} entry {}", S::KIND, id);
            if state.is_editing(id) {
                state.cancel();
            }
            Ok(DeleteOutcome::Deleted {
                id: id.to_string(),
                records: store.list()?,
            })
        }
    }
}

// --- Draft rules ---

impl EntityDraft for TagDraft {
    fn required_field(&self) -> (&'static str, &str) {
        ("Name", &self.name)
    }

    fn sanitized(self) -> Self {
        TagDraft { name: strip_all_html(self.name.trim()) }
    }
}

impl EntityDraft for StoryDraft {
    fn required_field(&self) -> (&'static str, &str) {
        ("Title", &self.title)
    }

    fn sanitized(self) -> Self {
        let mut tag_ids: Vec<String> = self
            .tag_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        tag_ids.dedup();
        StoryDraft {
            title: strip_all_html(self.title.trim()),
            storyteller: strip_all_html(self.storyteller.trim()),
            location: strip_all_html(self.location.trim()),
            latitude: self.latitude,
            longitude: self.longitude,
            video_url: strip_all_html(self.video_url.trim()),
            summary: strip_all_html(self.summary.trim()),
            tag_ids,
        }
    }
}

impl EntityDraft for OrganisationDraft {
    fn required_field(&self) -> (&'static str, &str) {
        ("Name", &self.name)
    }

    fn sanitized(self) -> Self {
        OrganisationDraft {
            name: strip_all_html(self.name.trim()),
            description: strip_all_html(self.description.trim()),
            website: strip_all_html(self.website.trim()),
            logo_url: strip_optional(self.logo_url.as_deref()),
        }
    }
}

impl EntityDraft for AdvisorDraft {
    fn required_field(&self) -> (&'static str, &str) {
        ("Name", &self.name)
    }

    fn sanitized(self) -> Self {
        AdvisorDraft {
            name: strip_all_html(self.name.trim()),
            title: strip_all_html(self.title.trim()),
            bio: strip_all_html(self.bio.trim()),
            image_url: strip_optional(self.image_url.as_deref()),
        }
    }
}

impl EntityDraft for BlogPostDraft {
    fn required_field(&self) -> (&'static str, &str) {
        ("Title", &self.title)
    }

    fn sanitized(self) -> Self {
        BlogPostDraft {
            title: strip_all_html(self.title.trim()),
            author: strip_all_html(self.author.trim()),
            summary: strip_all_html(self.summary.trim()),
            content: sanitize_markdown_content(self.content.trim()),
            images: self
                .images
                .iter()
                .filter_map(|url| strip_optional(Some(url)))
                .collect(),
        }
    }
}
