use super::DbError;
use crate::models::{BlogMetadata, BlogPost, BlogPostDraft, BlogSummary};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

pub const BLOG_POSTS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("blog_posts");
pub const BLOG_METADATA: TableDefinition<&[u8; 16], &str> = TableDefinition::new("blog_metadata");
// Keyed by negated creation timestamp so iteration yields newest first.
pub const BLOG_CHRONOLOGICAL_INDEX: TableDefinition<(i64, &[u8; 16]), ()> = TableDefinition::new("blog_chronological_index");

// A malformed id cannot name a stored post.
fn parse_post_id(post_id: &str) -> Result<[u8; 16], DbError> {
    Uuid::parse_str(post_id)
        .map(Uuid::into_bytes)
        .map_err(|_| DbError::NotFound(format!("blog post {}", post_id)))
}

pub fn create_blog_post(db: &Database, draft: &BlogPostDraft) -> Result<String, DbError> {
    let post_uuid = Uuid::new_v4();
    let metadata = BlogMetadata {
        title: draft.title.clone(),
        author: draft.author.clone(),
        summary: draft.summary.clone(),
        images: draft.images.clone(),
        created_at: Utc::now(),
        last_updated_at: None,
    };
    let metadata_json = serde_json::to_string(&metadata)?;

    let write_txn = db.begin_write()?;
    {
        let mut posts_table = write_txn.open_table(BLOG_POSTS)?;
        let mut metadata_table = write_txn.open_table(BLOG_METADATA)?;
        let mut chrono_index = write_txn.open_table(BLOG_CHRONOLOGICAL_INDEX)?;

        let post_id_bytes = post_uuid.into_bytes();
        posts_table.insert(&post_id_bytes, draft.content.as_str())?;
        metadata_table.insert(&post_id_bytes, metadata_json.as_str())?;
        chrono_index.insert((-metadata.created_at.timestamp_micros(), &post_id_bytes), ())?;
    }
    write_txn.commit()?;

    Ok(post_uuid.to_string())
}

/// Rewrites a post in place, keeping its creation time and index position.
pub fn update_blog_post(db: &Database, post_id: &str, draft: &BlogPostDraft) -> Result<(), DbError> {
    let post_id_bytes = parse_post_id(post_id)?;

    let write_txn = db.begin_write()?;
    {
        let mut posts_table = write_txn.open_table(BLOG_POSTS)?;
        let mut metadata_table = write_txn.open_table(BLOG_METADATA)?;

        let old_meta: BlogMetadata = {
            let old_meta_guard = metadata_table
                .get(&post_id_bytes)?
                .ok_or_else(|| DbError::NotFound(format!("blog post {}", post_id)))?;
            serde_json::from_str(old_meta_guard.value())?
        };

        let new_meta = BlogMetadata {
            title: draft.title.clone(),
            author: draft.author.clone(),
            summary: draft.summary.clone(),
            images: draft.images.clone(),
            created_at: old_meta.created_at,
            last_updated_at: Some(Utc::now()),
        };
        let new_meta_json = serde_json::to_string(&new_meta)?;

        posts_table.insert(&post_id_bytes, draft.content.as_str())?;
        metadata_table.insert(&post_id_bytes, new_meta_json.as_str())?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn delete_blog_post(db: &Database, post_id: &str) -> Result<(), DbError> {
    let post_id_bytes = parse_post_id(post_id)?;

    let write_txn = db.begin_write()?;
    {
        let mut posts_table = write_txn.open_table(BLOG_POSTS)?;
        let mut metadata_table = write_txn.open_table(BLOG_METADATA)?;
        let mut chrono_index = write_txn.open_table(BLOG_CHRONOLOGICAL_INDEX)?;

        let meta: BlogMetadata = {
            let meta_guard = metadata_table
                .get(&post_id_bytes)?
                .ok_or_else(|| DbError::NotFound(format!("blog post {}", post_id)))?;
            serde_json::from_str(meta_guard.value())?
        };

        chrono_index.remove((-meta.created_at.timestamp_micros(), &post_id_bytes))?;
        posts_table.remove(&post_id_bytes)?;
        metadata_table.remove(&post_id_bytes)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn read_blog_post(db: &Database, id: &str) -> Result<Option<BlogPost>, DbError> {
    let post_uuid = match Uuid::parse_str(id) {
        Ok(uuid) => uuid,
        Err(_) => return Ok(None),
    };
    let post_id_bytes = post_uuid.into_bytes();

    let read_txn = db.begin_read()?;
    let posts_table = read_txn.open_table(BLOG_POSTS)?;
    let metadata_table = read_txn.open_table(BLOG_METADATA)?;

    let content = match posts_table.get(&post_id_bytes)? {
        Some(guard) => guard.value().to_string(),
        None => return Ok(None),
    };
    let metadata: BlogMetadata = match metadata_table.get(&post_id_bytes)? {
        Some(guard) => serde_json::from_str(guard.value())?,
        None => return Ok(None),
    };

    Ok(Some(BlogPost { id: post_uuid.to_string(), metadata, content }))
}

/// Summaries in publication order, newest first.
pub fn read_latest_blog_summaries(db: &Database, limit: u32, offset: u32) -> Result<Vec<BlogSummary>, DbError> {
    let read_txn = db.begin_read()?;
    let chrono_index = read_txn.open_table(BLOG_CHRONOLOGICAL_INDEX)?;
    let metadata_table = read_txn.open_table(BLOG_METADATA)?;

    let mut posts = Vec::new();
    for item in chrono_index.iter()?.skip(offset as usize).take(limit as usize) {
        let (key, _) = match item {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable blog index entry: {}", e);
                continue;
            }
        };
        let post_id_bytes = key.value().1;
        let post_uuid = Uuid::from_bytes(*post_id_bytes);
        let metadata_json = match metadata_table.get(post_id_bytes) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                log::warn!("Blog index lists post {} but it has no metadata", post_uuid);
                continue;
            }
            Err(e) => {
                log::warn!("Could not read metadata of blog post {}: {}", post_uuid, e);
                continue;
            }
        };
        match serde_json::from_str::<BlogMetadata>(metadata_json.value()) {
            Ok(metadata) => posts.push(BlogSummary { id: post_uuid.to_string(), metadata }),
            Err(e) => log::warn!("Skipping blog post {} with unreadable metadata: {}", post_uuid, e),
        }
    }
    Ok(posts)
}

pub fn read_all_blog_summaries(db: &Database) -> Result<Vec<BlogSummary>, DbError> {
    read_latest_blog_summaries(db, u32::MAX, 0)
}
