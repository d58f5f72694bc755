//! Escalating confirmation for permanently deleting a submission.
//!
//! A submission carries personal and consent data, so destroying one takes
//! three "delete" presses followed by a fourth press with the confirmation
//! phrase typed in. The session is a plain value; [`transition`] computes the
//! next session and tells the caller whether the destructive call should be
//! issued. Nothing in this module touches storage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phrase the operator must type (trimmed, any case) before the final press.
pub const CONFIRMATION_PHRASE: &str = "delete consent records";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStep {
    #[default]
    Idle,
    Warned,
    CriticallyWarned,
    AwaitingTypedConfirmation,
}

impl DeletionStep {
    /// Numeric step as shown on the dashboard (0 to 3).
    pub fn index(self) -> u8 {
        match self {
            DeletionStep::Idle => 0,
            DeletionStep::Warned => 1,
            DeletionStep::CriticallyWarned => 2,
            DeletionStep::AwaitingTypedConfirmation => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeletionSession {
    pub step: DeletionStep,
    pub target: Option<String>,
    pub typed_text: String,
}

impl DeletionSession {
    pub fn is_idle(&self) -> bool {
        self.step == DeletionStep::Idle
    }

    pub fn is_armed_for(&self, submission_id: &str) -> bool {
        !self.is_idle() && self.target.as_deref() == Some(submission_id)
    }

    fn armed(submission_id: &str) -> Self {
        DeletionSession {
            step: DeletionStep::Warned,
            target: Some(submission_id.to_string()),
            typed_text: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionAction {
    /// The operator pressed "delete" on a submission row.
    Delete { submission_id: String },
    /// The operator edited the confirmation text box.
    Type { text: String },
    Cancel,
    /// The backend confirmed the deletion.
    Completed,
    /// The backend rejected or failed the deletion.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    #[error("Type \"{expected}\" to confirm permanent deletion.")]
    PhraseMismatch { expected: &'static str },
}

/// What the caller must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    Reject(ConfirmationError),
    DeleteSubmission(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub session: DeletionSession,
    pub effect: Effect,
}

impl TransitionOutcome {
    fn quiet(session: DeletionSession) -> Self {
        TransitionOutcome { session, effect: Effect::None }
    }
}

pub fn phrase_matches(typed: &str) -> bool {
    typed.trim().to_lowercase() == CONFIRMATION_PHRASE
}

/// Computes the next session. Total over every (session, action) pair.
///
/// When the final press carries the right phrase the returned session stays
/// in `AwaitingTypedConfirmation` with `Effect::DeleteSubmission`; the caller
/// reports the backend result through `Completed` or `Failed`, both of which
/// return the session to `Idle`.
pub fn transition(current: &DeletionSession, action: DeletionAction) -> TransitionOutcome {
    match action {
        DeletionAction::Delete { submission_id } => {
            if !current.is_armed_for(&submission_id) {
                return TransitionOutcome::quiet(DeletionSession::armed(&submission_id));
            }
            match current.step {
                DeletionStep::Idle => TransitionOutcome::quiet(DeletionSession::armed(&submission_id)),
                DeletionStep::Warned => TransitionOutcome::quiet(DeletionSession {
                    step: DeletionStep::CriticallyWarned,
                    ..current.clone()
                }),
                DeletionStep::CriticallyWarned => TransitionOutcome::quiet(DeletionSession {
                    step: DeletionStep::AwaitingTypedConfirmation,
                    typed_text: String::new(),
                    ..current.clone()
                }),
                DeletionStep::AwaitingTypedConfirmation => {
                    if phrase_matches(&current.typed_text) {
                        TransitionOutcome {
                            session: current.clone(),
                            effect: Effect::DeleteSubmission(submission_id),
                        }
                    } else {
                        TransitionOutcome {
                            session: current.clone(),
                            effect: Effect::Reject(ConfirmationError::PhraseMismatch {
                                expected: CONFIRMATION_PHRASE,
                            }),
                        }
                    }
                }
            }
        }
        DeletionAction::Type { text } => {
            if current.step == DeletionStep::AwaitingTypedConfirmation {
                TransitionOutcome::quiet(DeletionSession {
                    typed_text: text,
                    ..current.clone()
                })
            } else {
                TransitionOutcome::quiet(current.clone())
            }
        }
        DeletionAction::Cancel | DeletionAction::Completed | DeletionAction::Failed => {
            TransitionOutcome::quiet(DeletionSession::default())
        }
    }
}
