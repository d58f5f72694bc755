use serde::{Deserialize, Serialize};
use std::fmt;

pub const NEW_TARGET: &str = "new";

/// Which row of a listing is being edited. `New` is the blank create row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EditingTarget {
    New,
    Existing(String),
}

impl From<String> for EditingTarget {
    fn from(raw: String) -> Self {
        if raw.trim() == NEW_TARGET {
            EditingTarget::New
        } else {
            EditingTarget::Existing(raw.trim().to_string())
        }
    }
}

impl From<EditingTarget> for String {
    fn from(target: EditingTarget) -> Self {
        target.to_string()
    }
}

impl fmt::Display for EditingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditingTarget::New => f.write_str(NEW_TARGET),
            EditingTarget::Existing(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePress {
    Armed,
    Confirmed,
}

/// Per-listing editor state: one editing target and one armed delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineEditorState {
    pub editing: Option<EditingTarget>,
    pub armed_delete: Option<String>,
}

impl InlineEditorState {
    pub fn begin(&mut self, target: EditingTarget) {
        self.editing = Some(target);
        self.armed_delete = None;
    }

    pub fn cancel(&mut self) {
        self.editing = None;
        self.armed_delete = None;
    }

    pub fn finish_save(&mut self) {
        self.cancel();
    }

    /// First press on an id arms it; a second press on the same id confirms.
    pub fn press_delete(&mut self, id: &str) -> DeletePress {
        if self.armed_delete.as_deref() == Some(id) {
            self.armed_delete = None;
            DeletePress::Confirmed
        } else {
            self.armed_delete = Some(id.to_string());
            DeletePress::Armed
        }
    }

    pub fn disarm(&mut self) {
        self.armed_delete = None;
    }

    pub fn is_editing(&self, id: &str) -> bool {
        matches!(&self.editing, Some(EditingTarget::Existing(current)) if current == id)
    }
}
