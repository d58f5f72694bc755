use std::sync::{Arc, RwLock};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
pub type DbPool = Pool<SqliteConnectionManager>;

/// Settings that public handlers read on every request. Kept in memory and
/// refreshed whenever an admin saves the settings form.
pub struct AppState {
    pub consent_policy_version: Arc<RwLock<String>>,
}

impl AppState {
    pub fn new(consent_policy_version: String) -> Self {
        AppState {
            consent_policy_version: Arc::new(RwLock::new(consent_policy_version)),
        }
    }

    pub fn consent_policy_version(&self) -> String {
        self.consent_policy_version
            .read()
            .unwrap_or_else(|poisoned| {
                log::error!("RwLock for consent_policy_version was poisoned! Using stale data.");
                poisoned.into_inner()
            })
            .clone()
    }

    pub fn set_consent_policy_version(&self, version: &str) {
        let mut current = self.consent_policy_version.write().unwrap_or_else(|poisoned| {
            log::error!("RwLock for consent_policy_version was poisoned during settings update! Recovering lock.");
            poisoned.into_inner()
        });
        *current = version.to_string();
    }
}

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
