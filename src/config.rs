use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_GEOCODER_USER_AGENT: &str = "climate-stories-backend";

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    // Populated from the .env file
    pub database_path: String,
    pub media_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub admin_url_prefix: String,
    pub use_secure_cookies: bool,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| {
        config::ConfigError::Message(format!(
            "FATAL: Environment variable '{}' is not set in your .env file.",
            name
        ))
    })
}

fn require_absolute(name: &str, value: &str) -> Result<(), config::ConfigError> {
    if Path::new(value).is_relative() {
        return Err(config::ConfigError::Message(format!(
            "FATAL: The '{}' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
            name, value
        )));
    }
    Ok(())
}

/// Admin URL segments may only hold letters, digits, underscores and hyphens.
pub fn is_valid_url_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// The session key must be 128 hex characters (64 bytes).
pub fn is_valid_session_key(key: &str) -> bool {
    key.len() == 128 && key.chars().all(|c| c.is_ascii_hexdigit())
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;
        Self::from_process_env("config/default.toml")
    }

    /// Builds the configuration from variables already in the process
    /// environment, layered over the TOML defaults at `defaults_path`.
    pub fn from_process_env(defaults_path: &str) -> Result<Self, config::ConfigError> {
        let database_path = required_var("DATABASE_PATH")?;
        let media_path = required_var("MEDIA_PATH")?;
        let session_secret_key = required_var("SESSION_SECRET_KEY")?;
        let admin_url_prefix = required_var("ADMIN_URL_PREFIX")?;

        if !is_valid_session_key(&session_secret_key) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string(),
            ));
        }
        if !is_valid_url_prefix(&admin_url_prefix) {
            return Err(config::ConfigError::Message(
                "FATAL: 'ADMIN_URL_PREFIX' must not be empty and can only contain letters, numbers, underscores, and hyphens.".to_string(),
            ));
        }
        require_absolute("DATABASE_PATH", &database_path)?;
        require_absolute("MEDIA_PATH", &media_path)?;

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);
        let geocoder_url = env::var("GEOCODER_URL").unwrap_or_else(|_| DEFAULT_GEOCODER_URL.to_string());
        let geocoder_user_agent =
            env::var("GEOCODER_USER_AGENT").unwrap_or_else(|_| DEFAULT_GEOCODER_USER_AGENT.to_string());

        let builder = config::Config::builder()
            // Host and port come from the TOML file.
            .add_source(config::File::new(defaults_path, config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("media_path", media_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("admin_url_prefix", admin_url_prefix)?
            .set_override("geocoder_url", geocoder_url)?
            .set_override("geocoder_user_agent", geocoder_user_agent)?
            .build()?;

        builder.try_deserialize()
    }

    /// SQLite file holding users, settings, submissions and the catalog.
    pub fn content_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("content").join("content.db")
    }

    /// redb file holding blog posts.
    pub fn blog_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("blog").join("blog.db")
    }

    pub fn admin_base_url(&self) -> String {
        format!("/management/{}", self.admin_url_prefix)
    }
}
