pub mod admin_helpers;
pub mod editor_helpers;
pub mod entity_stores;
pub mod form_helpers;
pub mod geocoding;
pub mod media_helpers;
pub mod moderation_helpers;
pub mod public_helpers;
pub mod sanitization_helpers;
pub mod session_helpers;
