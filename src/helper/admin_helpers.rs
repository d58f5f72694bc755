use crate::models::db_operations::users_db_operations::{self, ROLE_ADMIN};
use crate::setup::db_setup::DEFAULT_CONSENT_POLICY_VERSION;
use crate::DbPool;
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdminHelperError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub max_file_upload_size_mb: String,
    pub allowed_mime_types: String,
    pub consent_policy_version: String,
}

/// Largest per-file upload limit the settings form accepts.
pub const MAX_UPLOAD_SIZE_MB: u64 = 1024;

/// Parses the upload size field of the settings form; `None` when it is not
/// a whole number or exceeds [`MAX_UPLOAD_SIZE_MB`].
pub fn parse_upload_size_mb(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|mb| *mb <= MAX_UPLOAD_SIZE_MB)
}

impl Settings {
    /// Values stored before the bound existed are clamped to it.
    pub fn max_file_upload_bytes(&self) -> u64 {
        let mb = self.max_file_upload_size_mb.parse::<u64>().unwrap_or(10);
        mb.min(MAX_UPLOAD_SIZE_MB).saturating_mul(1024 * 1024)
    }

    pub fn allowed_mime_types(&self) -> Vec<String> {
        self.allowed_mime_types
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

// Takes a direct connection so startup code can call it before the pool is
// shared with the workers.
pub fn get_settings(conn: &Connection) -> Settings {
    let max_size = users_db_operations::read_setting(conn, "max_file_upload_size_mb")
        .unwrap_or_else(|| "10".to_string());
    let mime_types = users_db_operations::read_setting(conn, "allowed_mime_types").unwrap_or_default();
    let policy = users_db_operations::read_setting(conn, "consent_policy_version")
        .unwrap_or_else(|| DEFAULT_CONSENT_POLICY_VERSION.to_string());

    Settings {
        max_file_upload_size_mb: max_size,
        allowed_mime_types: mime_types,
        consent_policy_version: policy,
    }
}

pub fn load_settings(pool: &DbPool) -> Result<Settings, AdminHelperError> {
    let conn = pool.get()?;
    Ok(get_settings(&conn))
}

pub fn update_setting(pool: &DbPool, key: &str, value: &str) -> Result<(), AdminHelperError> {
    let conn = pool.get()?;
    users_db_operations::update_setting(&conn, key, value)?;
    Ok(())
}

/// Checks a login attempt. Only active accounts holding the admin role may
/// enter the dashboard.
pub fn verify_admin_credentials(pool: &DbPool, username: &str, password: &str) -> AdminLogin {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for admin login: {}", e);
            return AdminLogin::Invalid;
        }
    };
    match users_db_operations::verify_credentials(&conn, username, password) {
        Some((user, role)) if role == ROLE_ADMIN => {
            if let Err(e) = users_db_operations::update_last_login_time(&conn, &user) {
                log::warn!("Could not record login time for '{}': {}", user, e);
            }
            AdminLogin::Admin(user)
        }
        Some(_) => AdminLogin::NotAnAdmin,
        None => AdminLogin::Invalid,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AdminLogin {
    Admin(String),
    NotAnAdmin,
    Invalid,
}
