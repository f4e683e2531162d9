//! Merges resolved sessions and rosters with recorded attendance into export rows.

use crate::models::{ExportRow, Session, Status, Student};
use crate::range::DateRange;
use crate::resolver::{SessionResolver, SessionsInRange};
use crate::store::{AttendanceStore, SessionStore, StoreError, StoreResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::vec;
use tracing::warn;

/// Shared count of attendance lookups that failed during an export.
///
/// Clones observe the same counter, so the caller can keep one while the joiner is consumed.
#[derive(Debug, Clone, Default)]
pub struct LookupFailures(Arc<AtomicUsize>);

impl LookupFailures {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Streams one [`ExportRow`] per `(session, rostered student)` pair.
///
/// Sessions come in resolver order and students in roster order. Only the roster of the
/// session currently being emitted is held in memory.
///
/// A failed attendance lookup does not stop the stream: the row is emitted with
/// [`Status::Unknown`] and counted in [`LookupFailures`]. A failure to list sessions, to load
/// a roster, or to reach the store at all is yielded once and ends the iterator.
pub struct AttendanceJoiner<'s, S: ?Sized, A: ?Sized> {
    resolver: &'s SessionResolver<'s, S>,
    sessions: SessionsInRange<'s, S>,
    attendance: &'s A,
    current: Option<(Session, vec::IntoIter<Student>)>,
    failures: LookupFailures,
    finished: bool,
}

impl<'s, S, A> AttendanceJoiner<'s, S, A>
where
    S: SessionStore + ?Sized,
    A: AttendanceStore + ?Sized,
{
    pub fn new(
        resolver: &'s SessionResolver<'s, S>,
        attendance: &'s A,
        range: &DateRange,
        failures: LookupFailures,
    ) -> Self {
        Self {
            resolver,
            sessions: resolver.sessions_in_range(range),
            attendance,
            current: None,
            failures,
            finished: false,
        }
    }

    /// Moves on to the next session and loads its roster.
    fn advance(&mut self) -> Option<StoreResult<()>> {
        let session = match self.sessions.next()? {
            Ok(session) => session,
            Err(err) => return Some(Err(err)),
        };
        match self.resolver.roster_of(&session.id) {
            Ok(roster) => {
                self.current = Some((session, roster.into_iter()));
                Some(Ok(()))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

impl<S, A> Iterator for AttendanceJoiner<'_, S, A>
where
    S: SessionStore + ?Sized,
    A: AttendanceStore + ?Sized,
{
    type Item = StoreResult<ExportRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Some((session, roster)) = &mut self.current
                && let Some(student) = roster.next()
            {
                return match lookup_status(self.attendance, &self.failures, session, &student) {
                    Ok(status) => Some(Ok(ExportRow::new(session, &student, status))),
                    Err(err) => {
                        self.finished = true;
                        Some(Err(err))
                    }
                };
            }
            self.current = None;

            match self.advance() {
                Some(Ok(())) => continue,
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}

/// A lookup that fails on its own becomes [`Status::Unknown`]. An unreachable store is
/// returned as an error.
fn lookup_status<A: AttendanceStore + ?Sized>(
    attendance: &A,
    failures: &LookupFailures,
    session: &Session,
    student: &Student,
) -> StoreResult<Status> {
    match attendance.attendance_of(&session.id, &student.id) {
        Ok(Some(status)) => Ok(status),
        Ok(None) => Ok(Status::Unmarked),
        Err(err @ StoreError::Unavailable(_)) => Err(err),
        Err(err @ StoreError::Query(_)) => {
            failures.record();
            warn!(
                session_id = %session.id,
                student_id = %student.id,
                error = %err,
                "attendance lookup failed; emitting row as unknown"
            );
            Ok(Status::Unknown)
        }
    }
}
