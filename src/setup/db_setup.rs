use crate::models::db_operations::blog_db_operations::{BLOG_CHRONOLOGICAL_INDEX, BLOG_METADATA, BLOG_POSTS};
use redb::{CommitError, Database, StorageError, TableError, TransactionError};
use rusqlite::{Connection, Result as RusqliteResult, Transaction};
use thiserror::Error;

pub const DEFAULT_CONSENT_POLICY_VERSION: &str = "2024-01";

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
}

pub fn setup_content_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    log::info!("Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'viewer')),
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login_time TEXT
        )",
        [],
    )?;

    log::info!("Creating 'settings' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    log::info!("Creating 'submissions' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS submissions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            location TEXT,
            occupation TEXT,
            story TEXT NOT NULL,
            additional_notes TEXT,
            consent_version TEXT NOT NULL,
            approved INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    log::info!("Creating 'tags' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE
        )",
        [],
    )?;

    log::info!("Creating 'stories' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS stories (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            storyteller TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            latitude REAL,
            longitude REAL,
            video_url TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    log::info!("Creating 'story_tags' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS story_tags (
            story_id TEXT NOT NULL,
            tag_id TEXT NOT NULL,
            PRIMARY KEY (story_id, tag_id),
            FOREIGN KEY (story_id) REFERENCES stories(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        )",
        [],
    )?;

    log::info!("Creating 'organisations' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS organisations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            website TEXT NOT NULL DEFAULT '',
            logo_url TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    log::info!("Creating 'advisors' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS advisors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            bio TEXT NOT NULL DEFAULT '',
            image_url TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    seed_initial_settings(&tx)?;

    tx.commit()?;
    Ok(())
}

fn seed_initial_settings(tx: &Transaction) -> RusqliteResult<()> {
    log::info!("Seeding initial settings...");
    tx.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES ('max_file_upload_size_mb', ?1)",
        ["10"],
    )?;

    // Uploads stay disabled until an admin lists the accepted image types.
    tx.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES ('allowed_mime_types', ?1)",
        [""],
    )?;

    tx.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES ('consent_policy_version', ?1)",
        [DEFAULT_CONSENT_POLICY_VERSION],
    )?;
    Ok(())
}

pub fn setup_blog_db(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        log::info!("Creating 'blog_posts' table in Redb...");
        write_txn.open_table(BLOG_POSTS)?;

        log::info!("Creating 'blog_metadata' table in Redb...");
        write_txn.open_table(BLOG_METADATA)?;

        log::info!("Creating 'blog_chronological_index' table in Redb...");
        write_txn.open_table(BLOG_CHRONOLOGICAL_INDEX)?;
    }
    write_txn.commit()?;
    Ok(())
}
