use crate::helper::editor_helpers::{EditorError, EntityStore};
use crate::models::db_operations::{blog_db_operations, catalog_db_operations, DbError};
use crate::models::{
    AdvisorDraft, BlogPostDraft, BlogSummary, GlobalAdvisor, Organisation, OrganisationDraft, Story, StoryDraft, Tag,
    TagDraft,
};
use crate::DbPool;
use redb::Database;
use std::sync::Arc;

#[derive(Clone)]
pub struct TagStore(pub DbPool);

impl EntityStore for TagStore {
    type Record = Tag;
    type Draft = TagDraft;
    const KIND: &'static str = "tags";

    fn list(&self) -> Result<Vec<Tag>, DbError> {
        catalog_db_operations::read_all_tags(&*self.0.get()?)
    }

    fn create(&self, draft: &TagDraft) -> Result<String, DbError> {
        catalog_db_operations::create_tag(&*self.0.get()?, &draft.name)
    }

    fn update(&self, id: &str, draft: &TagDraft) -> Result<(), DbError> {
        catalog_db_operations::update_tag(&*self.0.get()?, id, &draft.name)
    }

    fn delete(&self, id: &str) -> Result<(), DbError> {
        catalog_db_operations::delete_tag(&mut *self.0.get()?, id)
    }
}

#[derive(Clone)]
pub struct StoryStore(pub DbPool);

impl EntityStore for StoryStore {
    type Record = Story;
    type Draft = StoryDraft;
    const KIND: &'static str = "stories";

    fn list(&self) -> Result<Vec<Story>, DbError> {
        catalog_db_operations::read_all_stories(&*self.0.get()?)
    }

    fn create(&self, draft: &StoryDraft) -> Result<String, DbError> {
        catalog_db_operations::create_story(&mut *self.0.get()?, draft)
    }

    fn update(&self, id: &str, draft: &StoryDraft) -> Result<(), DbError> {
        catalog_db_operations::update_story(&mut *self.0.get()?, id, draft)
    }

    fn delete(&self, id: &str) -> Result<(), DbError> {
        catalog_db_operations::delete_story(&mut *self.0.get()?, id)
    }

    fn validate(&self, draft: &StoryDraft) -> Result<(), EditorError> {
        let unknown = catalog_db_operations::find_unknown_tag_ids(&*self.0.get().map_err(DbError::from)?, &draft.tag_ids)?;
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(EditorError::UnknownTags(unknown))
        }
    }
}

#[derive(Clone)]
pub struct OrganisationStore(pub DbPool);

impl EntityStore for OrganisationStore {
    type Record = Organisation;
    type Draft = OrganisationDraft;
    const KIND: &'static str = "organisations";

    fn list(&self) -> Result<Vec<Organisation>, DbError> {
        catalog_db_operations::read_all_organisations(&*self.0.get()?)
    }

    fn create(&self, draft: &OrganisationDraft) -> Result<String, DbError> {
        catalog_db_operations::create_organisation(&*self.0.get()?, draft)
    }

    fn update(&self, id: &str, draft: &OrganisationDraft) -> Result<(), DbError> {
        catalog_db_operations::update_organisation(&*self.0.get()?, id, draft)
    }

    fn delete(&self, id: &str) -> Result<(), DbError> {
        catalog_db_operations::delete_organisation(&*self.0.get()?, id)
    }
}

#[derive(Clone)]
pub struct AdvisorStore(pub DbPool);

impl EntityStore for AdvisorStore {
    type Record = GlobalAdvisor;
    type Draft = AdvisorDraft;
    const KIND: &'static str = "advisors";

    fn list(&self) -> Result<Vec<GlobalAdvisor>, DbError> {
        catalog_db_operations::read_all_advisors(&*self.0.get()?)
    }

    fn create(&self, draft: &AdvisorDraft) -> Result<String, DbError> {
        catalog_db_operations::create_advisor(&*self.0.get()?, draft)
    }

    fn update(&self, id: &str, draft: &AdvisorDraft) -> Result<(), DbError> {
        catalog_db_operations::update_advisor(&*self.0.get()?, id, draft)
    }

    fn delete(&self, id: &str) -> Result<(), DbError> {
        catalog_db_operations::delete_advisor(&*self.0.get()?, id)
    }
}

/// Blog posts live in the redb file rather than SQLite.
#[derive(Clone)]
pub struct BlogStore(pub Arc<Database>);

impl EntityStore for BlogStore {
    type Record = BlogSummary;
    type Draft = BlogPostDraft;
    const KIND: &'static str = "blog";

    fn list(&self) -> Result<Vec<BlogSummary>, DbError> {
        blog_db_operations::read_all_blog_summaries(&self.0)
    }

    fn create(&self, draft: &BlogPostDraft) -> Result<String, DbError> {
        blog_db_operations::create_blog_post(&self.0, draft)
    }

    fn update(&self, id: &str, draft: &BlogPostDraft) -> Result<(), DbError> {
        blog_db_operations::update_blog_post(&self.0, id, draft)
    }

    fn delete(&self, id: &str) -> Result<(), DbError> {
        blog_db_operations::delete_blog_post(&self.0, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::editor_helpers::{press_delete, save_entity, DeleteOutcome};
    use crate::models::db_operations::blog_db_operations::test_support::blog_db;
    use crate::models::db_operations::test_support::content_pool;
    use crate::models::inline_editor::{EditingTarget, InlineEditorState};

    #[test]
    fn story_with_unknown_tag_is_rejected_before_writing() {
        let store = StoryStore(content_pool());
        let mut state = InlineEditorState::default();
        state.begin(EditingTarget::New);

        let draft = StoryDraft {
            title: "Drought in the Sahel".to_string(),
            tag_ids: vec!["missing".to_string()],
            ..Default::default()
        };
        match save_entity(&store, &mut state, draft) {
            Err(EditorError::UnknownTags(ids)) => assert_eq!(ids, vec!["missing".to_string()]),
            other => panic!("expected unknown tag error, got {:?}", other.map(|s| s.len())),
        }
        assert!(store.list().unwrap().is_empty());
        assert!(state.editing.is_some());
    }

    #[test]
    fn story_is_saved_with_its_tags() {
        let pool = content_pool();
        let tags = TagStore(pool.clone());
        let stories = StoryStore(pool);
        let mut state = InlineEditorState::default();

        state.begin(EditingTarget::New);
        let tag_list = save_entity(&tags, &mut state, TagDraft { name: "Flooding".to_string() }).unwrap();

        state.begin(EditingTarget::New);
        let draft = StoryDraft {
            title: "River banks".to_string(),
            tag_ids: vec![tag_list[0].id.clone()],
            ..Default::default()
        };
        let saved = save_entity(&stories, &mut state, draft).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].tags[0].name, "Flooding");
    }

    #[test]
    fn pooled_stores_create_update_and_delete() {
        let pool = content_pool();
        let organisations = OrganisationStore(pool.clone());
        let advisors = AdvisorStore(pool.clone());
        let tags = TagStore(pool);
        let mut state = InlineEditorState::default();

        state.begin(EditingTarget::New);
        let draft = OrganisationDraft { name: "Reef Watch".to_string(), ..Default::default() };
        let id = save_entity(&organisations, &mut state, draft).unwrap()[0].id.clone();
        state.begin(EditingTarget::Existing(id.clone()));
        let draft = OrganisationDraft { name: "Reef Watch Kenya".to_string(), ..Default::default() };
        let listed = save_entity(&organisations, &mut state, draft).unwrap();
        assert_eq!((listed.len(), listed[0].name.as_str()), (1, "Reef Watch Kenya"));

        state.begin(EditingTarget::New);
        let draft = AdvisorDraft { name: "Dr. Okafor".to_string(), title: "Hydrologist".to_string(), ..Default::default() };
        let advisor_id = save_entity(&advisors, &mut state, draft).unwrap()[0].id.clone();
        press_delete(&advisors, &mut state, &advisor_id).unwrap();
        assert!(matches!(press_delete(&advisors, &mut state, &advisor_id).unwrap(), DeleteOutcome::Deleted { .. }));
        assert!(advisors.list().unwrap().is_empty());

        state.begin(EditingTarget::New);
        let tag_id = save_entity(&tags, &mut state, TagDraft { name: "Coral".to_string() }).unwrap()[0].id.clone();
        tags.delete(&tag_id).unwrap();
        assert!(tags.list().unwrap().is_empty());
        organisations.delete(&id).unwrap();
        assert!(organisations.list().unwrap().is_empty());
    }

    #[test]
    fn blog_posts_go_through_the_same_flow() {
        let (db, path) = blog_db();
        let store = BlogStore(Arc::new(db));
        let mut state = InlineEditorState::default();

        state.begin(EditingTarget::New);
        let draft = BlogPostDraft {
            title: "Field notes".to_string(),
            content: "First entry".to_string(),
            ..Default::default()
        };
        let posts = save_entity(&store, &mut state, draft).unwrap();
        let id = posts[0].id.clone();

        assert!(matches!(press_delete(&store, &mut state, &id).unwrap(), DeleteOutcome::Armed { .. }));
        match press_delete(&store, &mut state, &id).unwrap() {
            DeleteOutcome::Deleted { records, .. } => assert!(records.is_empty()),
            other => panic!("expected deletion, got {:?}", other),
        }
        drop(store);
        let _ = std::fs::remove_dir_all(path);
    }
}
