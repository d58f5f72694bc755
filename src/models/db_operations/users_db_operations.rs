use crate::models::AdminUser;
use bcrypt::{hash, verify, BcryptError};
use chrono::Utc;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_VIEWER: &str = "viewer";

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

pub fn create_user(conn: &Connection, username: &str, password: &str, role: &str) -> Result<(), RusqliteError> {
    let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
        params![username, hashed_password, role],
    )?;
    Ok(())
}

pub fn read_users_by_role(conn: &Connection, role: &str) -> Result<Vec<AdminUser>, RusqliteError> {
    let mut stmt = conn.prepare(
        "SELECT id, username, role, is_active, last_login_time FROM users WHERE role = ?1 ORDER BY id",
    )?;
    let users = stmt
        .query_map([role], |row| {
            Ok(AdminUser {
                id: row.get(0)?,
                username: row.get(1)?,
                role: row.get(2)?,
                is_active: row.get(3)?,
                last_login_time: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn change_password(conn: &Connection, username: &str, new_password: &str) -> Result<usize, RusqliteError> {
    let hashed_password = hash(new_password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE username = ?2",
        params![hashed_password, username],
    )
}

/// Returns `(username, role)` when the password matches an active account.
pub fn verify_credentials(conn: &Connection, username: &str, password: &str) -> Option<(String, String)> {
    let res: rusqlite::Result<(String, String, bool)> = conn.query_row(
        "SELECT password_hash, role, is_active FROM users WHERE username = ?1",
        [username],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    );

    match res {
        Ok((hash, role, true)) if verify(password, &hash).unwrap_or(false) => Some((username.to_string(), role)),
        _ => None,
    }
}

pub fn update_last_login_time(conn: &Connection, username: &str) -> Result<(), RusqliteError> {
    let now = Utc::now().to_rfc3339();
    conn.execute("UPDATE users SET last_login_time = ?1 WHERE username = ?2", params![now, username])?;
    Ok(())
}

pub fn read_setting(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
        .optional()
        .unwrap_or(None)
}

pub fn update_setting(conn: &Connection, key: &str, value: &str) -> Result<(), RusqliteError> {
    conn.execute("INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)", [key, value])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::content_pool;

    #[test]
    fn credentials_require_an_active_account() {
        let pool = content_pool();
        let conn = pool.get().unwrap();
        create_user(&conn, "curator", "s3cret", ROLE_ADMIN).unwrap();

        assert_eq!(
            verify_credentials(&conn, "curator", "s3cret"),
            Some(("curator".to_string(), ROLE_ADMIN.to_string()))
        );
        assert!(verify_credentials(&conn, "curator", "wrong").is_none());

        conn.execute("UPDATE users SET is_active = 0 WHERE username = 'curator'", []).unwrap();
        assert!(verify_credentials(&conn, "curator", "s3cret").is_none());
    }

    #[test]
    fn seeded_settings_can_be_replaced() {
        let pool = content_pool();
        let conn = pool.get().unwrap();
        assert_eq!(read_setting(&conn, "max_file_upload_size_mb").as_deref(), Some("10"));

        update_setting(&conn, "consent_policy_version", "2025-03").unwrap();
        assert_eq!(read_setting(&conn, "consent_policy_version").as_deref(), Some("2025-03"));
        assert!(read_setting(&conn, "missing").is_none());
    }
}
