//! The read interfaces the export pipeline consumes.
//!
//! The pipeline never talks to a database directly: it is handed something implementing
//! [`SessionStore`] and [`AttendanceStore`]. [`crate::manager::AttendanceManager`] is the SQLite
//! implementation; tests substitute in-memory fakes.

use crate::models::{Session, Status, Student};
use crate::range::DateRange;
use chrono::NaiveDate;
use thiserror::Error;

/// The underlying data source could not answer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("attendance store unavailable: {0}")]
    Unavailable(String),

    #[error("attendance store query failed: {0}")]
    Query(#[from] diesel::result::Error),
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyset position of the last session handed out, used to fetch the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCursor {
    pub date: NaiveDate,
    pub id: String,
}

impl From<&Session> for SessionCursor {
    fn from(session: &Session) -> Self {
        Self {
            date: session.date,
            id: session.id.clone(),
        }
    }
}

/// Read access to scheduled sessions and their roster snapshots.
pub trait SessionStore: Send + Sync {
    /// Returns up to `limit` sessions inside `range`, ordered by `(date, id)` ascending and
    /// strictly after `after` when given.
    fn sessions_page(
        &self,
        range: &DateRange,
        after: Option<&SessionCursor>,
        limit: usize,
    ) -> StoreResult<Vec<Session>>;

    /// Returns the students enrolled in a session, in roster order.
    fn roster_of(&self, session_id: &str) -> StoreResult<Vec<Student>>;
}

/// Read access to recorded attendance marks.
pub trait AttendanceStore: Send + Sync {
    /// Returns the recorded status for the pair, or `None` when nothing was recorded.
    fn attendance_of(&self, session_id: &str, student_id: &str) -> StoreResult<Option<Status>>;
}

/// Everything an export needs from storage.
pub trait ExportStore: SessionStore + AttendanceStore {}

impl<T: SessionStore + AttendanceStore + ?Sized> ExportStore for T {}
