//! Per-operator workflow state kept in the signed session cookie.

use crate::models::confirmation::DeletionSession;
use crate::models::inline_editor::InlineEditorState;
use actix_session::{Session, SessionInsertError};

const DELETION_SESSION_KEY: &str = "submission_deletion";

fn editor_key(kind: &str) -> String {
    format!("editor_{}", kind)
}

/// Unreadable state is treated as idle.
pub fn load_deletion_session(session: &Session) -> DeletionSession {
    match session.get::<DeletionSession>(DELETION_SESSION_KEY) {
        Ok(Some(state)) => state,
        Ok(None) => DeletionSession::default(),
        Err(e) => {
            log::warn!("Discarding unreadable deletion session: {}", e);
            DeletionSession::default()
        }
    }
}

pub fn store_deletion_session(session: &Session, state: &DeletionSession) -> Result<(), SessionInsertError> {
    if state.is_idle() {
        session.remove(DELETION_SESSION_KEY);
        Ok(())
    } else {
        session.insert(DELETION_SESSION_KEY, state)
    }
}

pub fn load_editor_state(session: &Session, kind: &str) -> InlineEditorState {
    match session.get::<InlineEditorState>(&editor_key(kind)) {
        Ok(Some(state)) => state,
        Ok(None) => InlineEditorState::default(),
        Err(e) => {
            log::warn!("Discarding unreadable {} editor state: {}", kind, e);
            InlineEditorState::default()
        }
    }
}

pub fn store_editor_state(session: &Session, kind: &str, state: &InlineEditorState) -> Result<(), SessionInsertError> {
    if state.editing.is_none() && state.armed_delete.is_none() {
        session.remove(&editor_key(kind));
        Ok(())
    } else {
        session.insert(editor_key(kind), state)
    }
}
