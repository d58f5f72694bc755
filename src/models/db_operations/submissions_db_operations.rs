use super::{format_timestamp, parse_timestamp, DbError};
use crate::models::{NewSubmission, Submission};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const SUBMISSION_COLUMNS: &str = "id, name, email, phone, location, occupation, story, additional_notes, consent_version, approved, created_at";

fn submission_from_row(row: &Row) -> rusqlite::Result<Submission> {
    let created_at: String = row.get(10)?;
    Ok(Submission {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        location: row.get(4)?,
        occupation: row.get(5)?,
        story: row.get(6)?,
        additional_notes: row.get(7)?,
        consent_version: row.get(8)?,
        approved: row.get(9)?,
        created_at: parse_timestamp(10, &created_at)?,
    })
}

/// Stores a new pending submission stamped with the consent policy version
/// the contributor agreed to.
pub fn create_submission(
    conn: &Connection,
    submission: &NewSubmission,
    consent_version: &str,
) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO submissions (id, name, email, phone, location, occupation, story, additional_notes, consent_version, approved, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
        params![
            id,
            submission.name,
            submission.email,
            submission.phone,
            submission.location,
            submission.occupation,
            submission.story,
            submission.additional_notes,
            consent_version,
            format_timestamp(Utc::now()),
        ],
    )?;
    Ok(id)
}

/// Every submission, newest first.
pub fn read_all_submissions(conn: &Connection) -> Result<Vec<Submission>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM submissions ORDER BY created_at DESC, rowid DESC",
        SUBMISSION_COLUMNS
    ))?;
    let submissions = stmt
        .query_map([], submission_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(submissions)
}

#[cfg(test)]
pub(crate) fn read_submission(conn: &Connection, id: &str) -> Result<Option<Submission>, DbError> {
    use rusqlite::OptionalExtension;
    let submission = conn
        .query_row(
            &format!("SELECT {} FROM submissions WHERE id = ?1", SUBMISSION_COLUMNS),
            [id],
            submission_from_row,
        )
        .optional()?;
    Ok(submission)
}

pub fn set_submission_approved(conn: &Connection, id: &str) -> Result<(), DbError> {
    let changed = conn.execute("UPDATE submissions SET approved = 1 WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("submission {}", id)));
    }
    Ok(())
}

pub fn delete_submission(conn: &Connection, id: &str) -> Result<(), DbError> {
    let changed = conn.execute("DELETE FROM submissions WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("submission {}", id)));
    }
    Ok(())
}
