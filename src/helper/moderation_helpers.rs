use crate::models::confirmation::{self, ConfirmationError, DeletionAction, DeletionSession, Effect};
use crate::models::db_operations::{submissions_db_operations, DbError};
use crate::models::Submission;
use crate::DbPool;
use serde::Serialize;
use thiserror::Error;

/// Storage calls the moderation workflow depends on.
pub trait SubmissionBackend {
    fn list_submissions(&self) -> Result<Vec<Submission>, DbError>;
    fn set_submission_approved(&self, id: &str) -> Result<(), DbError>;
    fn delete_submission(&self, id: &str) -> Result<(), DbError>;
}

impl SubmissionBackend for DbPool {
    fn list_submissions(&self) -> Result<Vec<Submission>, DbError> {
        let conn = self.get()?;
        submissions_db_operations::read_all_submissions(&conn)
    }

    fn set_submission_approved(&self, id: &str) -> Result<(), DbError> {
        let conn = self.get()?;
        submissions_db_operations::set_submission_approved(&conn, id)
    }

    fn delete_submission(&self, id: &str) -> Result<(), DbError> {
        let conn = self.get()?;
        submissions_db_operations::delete_submission(&conn, id)
    }
}

#[derive(Error, Debug)]
pub enum ModerationError {
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
    #[error("Backend error: {0}")]
    Backend(#[from] DbError),
}

/// Pending and approved partitions of one freshly loaded submission list.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationOverview {
    pub pending: Vec<Submission>,
    pub approved: Vec<Submission>,
    pub pending_count: usize,
    pub approved_count: usize,
}

impl ModerationOverview {
    pub fn from_submissions(submissions: Vec<Submission>) -> Self {
        let (approved, pending): (Vec<Submission>, Vec<Submission>) =
            submissions.into_iter().partition(|submission| submission.approved);
        ModerationOverview {
            pending_count: pending.len(),
            approved_count: approved.len(),
            pending,
            approved,
        }
    }
}

pub fn load_overview<B: SubmissionBackend + ?Sized>(backend: &B) -> Result<ModerationOverview, DbError> {
    Ok(ModerationOverview::from_submissions(backend.list_submissions()?))
}

/// Approval is a single non-destructive update followed by a full reload.
pub fn approve_submission<B: SubmissionBackend + ?Sized>(backend: &B, id: &str) -> Result<ModerationOverview, DbError> {
    backend.set_submission_approved(id)?;
    log::info!("Submission {} approved", id);
    load_overview(backend)
}

#[derive(Debug)]
pub enum DeletionProgress {
    /// The session moved (or stayed) without touching storage.
    Advanced,
    /// The record is gone. `overview` holds the reload that followed, which
    /// can fail on its own without undoing the deletion.
    Deleted {
        submission_id: String,
        overview: Result<ModerationOverview, DbError>,
    },
}

#[derive(Debug)]
pub struct DeletionReport {
    /// Session to keep for the operator's next request.
    pub session: DeletionSession,
    pub result: Result<DeletionProgress, ModerationError>,
}

/// Feeds one operator action through the confirmation state machine and
/// performs the permanent delete when the machine asks for it.
pub fn apply_deletion_action<B: SubmissionBackend + ?Sized>(
    backend: &B,
    session: &DeletionSession,
    action: DeletionAction,
) -> DeletionReport {
    let outcome = confirmation::transition(session, action);
    match outcome.effect {
        Effect::None => DeletionReport {
            session: outcome.session,
            result: Ok(DeletionProgress::Advanced),
        },
        Effect::Reject(err) => DeletionReport {
            session: outcome.session,
            result: Err(err.into()),
        },
        Effect::DeleteSubmission(submission_id) => match backend.delete_submission(&submission_id) {
            Ok(()) => {
                log::info!("Submission {} permanently deleted", submission_id);
                let session = confirmation::transition(&outcome.session, DeletionAction::Completed).session;
                let overview = load_overview(backend);
                if let Err(e) = &overview {
                    log::error!("Submission {} deleted but the reload failed: {}", submission_id, e);
                }
                DeletionReport {
                    session,
                    result: Ok(DeletionProgress::Deleted { submission_id, overview }),
                }
            }
            Err(e) => {
                log::error!("Failed to delete submission {}: {}", submission_id, e);
                DeletionReport {
                    session: confirmation::transition(&outcome.session, DeletionAction::Failed).session,
                    result: Err(e.into()),
                }
            }
        },
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Utc;
    use std::cell::{Cell, RefCell};

    pub fn submission(id: &str, approved: bool) -> Submission {
        Submission {
            id: id.to_string(),
            name: "Amina".to_string(),
            email: "amina@example.org".to_string(),
            phone: None,
            location: Some("Mombasa".to_string()),
            occupation: None,
            story: "Salt water in the wells.".to_string(),
            additional_notes: None,
            consent_version: "2024-01".to_string(),
            approved,
            created_at: Utc::now(),
        }
    }

    /// In-memory backend that records every mutating call.
    #[derive(Default)]
    pub struct RecordingBackend {
        pub submissions: RefCell<Vec<Submission>>,
        pub delete_calls: RefCell<Vec<String>>,
        pub approve_calls: RefCell<Vec<String>>,
        pub list_calls: Cell<usize>,
        pub fail_deletes: Cell<bool>,
        pub fail_lists: Cell<bool>,
    }

    impl RecordingBackend {
        pub fn with(submissions: Vec<Submission>) -> Self {
            RecordingBackend {
                submissions: RefCell::new(submissions),
                ..Default::default()
            }
        }
    }

    impl SubmissionBackend for RecordingBackend {
        fn list_submissions(&self) -> Result<Vec<Submission>, DbError> {
            self.list_calls.set(self.list_calls.get() + 1);
            if self.fail_lists.get() {
                return Err(DbError::NotFound("submission list".to_string()));
            }
            Ok(self.submissions.borrow().clone())
        }

        fn set_submission_approved(&self, id: &str) -> Result<(), DbError> {
            self.approve_calls.borrow_mut().push(id.to_string());
            let mut submissions = self.submissions.borrow_mut();
            let submission = submissions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| DbError::NotFound(format!("submission {}", id)))?;
            submission.approved = true;
            Ok(())
        }

        fn delete_submission(&self, id: &str) -> Result<(), DbError> {
            self.delete_calls.borrow_mut().push(id.to_string());
            if self.fail_deletes.get() {
                return Err(DbError::NotFound(format!("submission {}", id)));
            }
            self.submissions.borrow_mut().retain(|s| s.id != id);
            Ok(())
        }
    }
}
