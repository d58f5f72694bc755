use super::{format_timestamp, parse_timestamp, DbError};
use crate::models::{
    AdvisorDraft, GlobalAdvisor, MapMarker, Organisation, OrganisationDraft, Story, StoryDraft, Tag,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use uuid::Uuid;

fn ensure_changed(changed: usize, what: &str, id: &str) -> Result<(), DbError> {
    if changed == 0 {
        return Err(DbError::NotFound(format!("{} {}", what, id)));
    }
    Ok(())
}

// ====================================================================
// ============================ TAGS ==================================
// ====================================================================

pub fn read_all_tags(conn: &Connection) -> Result<Vec<Tag>, DbError> {
    let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name COLLATE NOCASE")?;
    let tags = stmt
        .query_map([], |row| Ok(Tag { id: row.get(0)?, name: row.get(1)? }))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tags)
}

pub fn create_tag(conn: &Connection, name: &str) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO tags (id, name) VALUES (?1, ?2)", params![id, name.trim()])?;
    Ok(id)
}

pub fn update_tag(conn: &Connection, id: &str, name: &str) -> Result<(), DbError> {
    let changed = conn.execute("UPDATE tags SET name = ?1 WHERE id = ?2", params![name.trim(), id])?;
    ensure_changed(changed, "tag", id)
}

/// Removes the tag and every story link pointing at it.
pub fn delete_tag(conn: &mut Connection, id: &str) -> Result<(), DbError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM story_tags WHERE tag_id = ?1", [id])?;
    let changed = tx.execute("DELETE FROM tags WHERE id = ?1", [id])?;
    ensure_changed(changed, "tag", id)?;
    tx.commit()?;
    Ok(())
}

/// Returns the ids from `ids` that do not name an existing tag.
pub fn find_unknown_tag_ids(conn: &Connection, ids: &[String]) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare("SELECT 1 FROM tags WHERE id = ?1")?;
    let mut unknown = Vec::new();
    for id in ids {
        if !stmt.exists([id])? {
            unknown.push(id.clone());
        }
    }
    Ok(unknown)
}

// ====================================================================
// =========================== STORIES ================================
// ====================================================================

const STORY_COLUMNS: &str = "id, title, storyteller, location, latitude, longitude, video_url, summary, created_at";

fn story_from_row(row: &Row) -> rusqlite::Result<Story> {
    let created_at: String = row.get(8)?;
    Ok(Story {
        id: row.get(0)?,
        title: row.get(1)?,
        storyteller: row.get(2)?,
        location: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
        video_url: row.get(6)?,
        summary: row.get(7)?,
        created_at: parse_timestamp(8, &created_at)?,
        tags: Vec::new(),
    })
}

fn read_story_tag_links(conn: &Connection) -> Result<HashMap<String, Vec<Tag>>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT st.story_id, t.id, t.name FROM story_tags st
         JOIN tags t ON t.id = st.tag_id
         ORDER BY t.name COLLATE NOCASE",
    )?;
    let mut links: HashMap<String, Vec<Tag>> = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, Tag { id: row.get(1)?, name: row.get(2)? }))
    })?;
    for row in rows {
        let (story_id, tag) = row?;
        links.entry(story_id).or_default().push(tag);
    }
    Ok(links)
}

fn attach_tags(conn: &Connection, mut stories: Vec<Story>) -> Result<Vec<Story>, DbError> {
    let mut links = read_story_tag_links(conn)?;
    for story in &mut stories {
        story.tags = links.remove(&story.id).unwrap_or_default();
    }
    Ok(stories)
}

/// Every story with its tags, newest first.
pub fn read_all_stories(conn: &Connection) -> Result<Vec<Story>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM stories ORDER BY created_at DESC, rowid DESC",
        STORY_COLUMNS
    ))?;
    let stories = stmt
        .query_map([], story_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    attach_tags(conn, stories)
}

pub fn read_stories_by_tag(conn: &Connection, tag_id: &str) -> Result<Vec<Story>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.title, s.storyteller, s.location, s.latitude, s.longitude, s.video_url, s.summary, s.created_at
         FROM stories s JOIN story_tags st ON st.story_id = s.id
         WHERE st.tag_id = ?1
         ORDER BY s.created_at DESC, s.rowid DESC",
    )?;
    let stories = stmt
        .query_map([tag_id], story_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    attach_tags(conn, stories)
}

pub fn read_story(conn: &Connection, id: &str) -> Result<Option<Story>, DbError> {
    let story = conn
        .query_row(
            &format!("SELECT {} FROM stories WHERE id = ?1", STORY_COLUMNS),
            [id],
            story_from_row,
        )
        .optional()?;
    match story {
        Some(story) => Ok(attach_tags(conn, vec![story])?.pop()),
        None => Ok(None),
    }
}

/// Stories that can be pinned on the map: both coordinates present.
pub fn read_map_markers(conn: &Connection) -> Result<Vec<MapMarker>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, location, latitude, longitude FROM stories
         WHERE latitude IS NOT NULL AND longitude IS NOT NULL
         ORDER BY created_at DESC",
    )?;
    let markers = stmt
        .query_map([], |row| {
            Ok(MapMarker {
                story_id: row.get(0)?,
                title: row.get(1)?,
                location: row.get(2)?,
                latitude: row.get(3)?,
                longitude: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(markers)
}

fn replace_story_tags(tx: &rusqlite::Transaction, story_id: &str, tag_ids: &[String]) -> Result<(), DbError> {
    tx.execute("DELETE FROM story_tags WHERE story_id = ?1", [story_id])?;
    for tag_id in tag_ids {
        tx.execute(
            "INSERT OR IGNORE INTO story_tags (story_id, tag_id) VALUES (?1, ?2)",
            params![story_id, tag_id],
        )?;
    }
    Ok(())
}

pub fn create_story(conn: &mut Connection, draft: &StoryDraft) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO stories (id, title, storyteller, location, latitude, longitude, video_url, summary, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            draft.title,
            draft.storyteller,
            draft.location,
            draft.latitude,
            draft.longitude,
            draft.video_url,
            draft.summary,
            format_timestamp(Utc::now()),
        ],
    )?;
    replace_story_tags(&tx, &id, &draft.tag_ids)?;
    tx.commit()?;
    Ok(id)
}

pub fn update_story(conn: &mut Connection, id: &str, draft: &StoryDraft) -> Result<(), DbError> {
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE stories SET title = ?1, storyteller = ?2, location = ?3, latitude = ?4, longitude = ?5, video_url = ?6, summary = ?7
         WHERE id = ?8",
        params![
            draft.title,
            draft.storyteller,
            draft.location,
            draft.latitude,
            draft.longitude,
            draft.video_url,
            draft.summary,
            id,
        ],
    )?;
    ensure_changed(changed, "story", id)?;
    replace_story_tags(&tx, id, &draft.tag_ids)?;
    tx.commit()?;
    Ok(())
}

pub fn delete_story(conn: &mut Connection, id: &str) -> Result<(), DbError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM story_tags WHERE story_id = ?1", [id])?;
    let changed = tx.execute("DELETE FROM stories WHERE id = ?1", [id])?;
    ensure_changed(changed, "story", id)?;
    tx.commit()?;
    Ok(())
}

// ====================================================================
// ========================= ORGANISATIONS ============================
// ====================================================================

pub fn read_all_organisations(conn: &Connection) -> Result<Vec<Organisation>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, website, logo_url, created_at FROM organisations ORDER BY name COLLATE NOCASE",
    )?;
    let organisations = stmt
        .query_map([], |row| {
            let created_at: String = row.get(5)?;
            Ok(Organisation {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                website: row.get(3)?,
                logo_url: row.get(4)?,
                created_at: parse_timestamp(5, &created_at)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(organisations)
}

pub fn create_organisation(conn: &Connection, draft: &OrganisationDraft) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO organisations (id, name, description, website, logo_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, draft.name, draft.description, draft.website, draft.logo_url, format_timestamp(Utc::now())],
    )?;
    Ok(id)
}

pub fn update_organisation(conn: &Connection, id: &str, draft: &OrganisationDraft) -> Result<(), DbError> {
    let changed = conn.execute(
        "UPDATE organisations SET name = ?1, description = ?2, website = ?3, logo_url = ?4 WHERE id = ?5",
        params![draft.name, draft.description, draft.website, draft.logo_url, id],
    )?;
    ensure_changed(changed, "organisation", id)
}

pub fn delete_organisation(conn: &Connection, id: &str) -> Result<(), DbError> {
    let changed = conn.execute("DELETE FROM organisations WHERE id = ?1", [id])?;
    ensure_changed(changed, "organisation", id)
}

// ====================================================================
// =========================== ADVISORS ===============================
// ====================================================================

pub fn read_all_advisors(conn: &Connection) -> Result<Vec<GlobalAdvisor>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, title, bio, image_url, created_at FROM advisors ORDER BY name COLLATE NOCASE",
    )?;
    let advisors = stmt
        .query_map([], |row| {
            let created_at: String = row.get(5)?;
            Ok(GlobalAdvisor {
                id: row.get(0)?,
                name: row.get(1)?,
                title: row.get(2)?,
                bio: row.get(3)?,
                image_url: row.get(4)?,
                created_at: parse_timestamp(5, &created_at)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(advisors)
}

pub fn create_advisor(conn: &Connection, draft: &AdvisorDraft) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO advisors (id, name, title, bio, image_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, draft.name, draft.title, draft.bio, draft.image_url, format_timestamp(Utc::now())],
    )?;
    Ok(id)
}

pub fn update_advisor(conn: &Connection, id: &str, draft: &AdvisorDraft) -> Result<(), DbError> {
    let changed = conn.execute(
        "UPDATE advisors SET name = ?1, title = ?2, bio = ?3, image_url = ?4 WHERE id = ?5",
        params![draft.name, draft.title, draft.bio, draft.image_url, id],
    )?;
    ensure_changed(changed, "advisor", id)
}

pub fn delete_advisor(conn: &Connection, id: &str) -> Result<(), DbError> {
    let changed = conn.execute("DELETE FROM advisors WHERE id = ?1", [id])?;
    ensure_changed(changed, "advisor", id)
}
