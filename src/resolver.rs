//! Resolution of the sessions inside a window and of their rosters.

use crate::models::{Session, Student};
use crate::range::DateRange;
use crate::store::{SessionCursor, SessionStore, StoreResult};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// The default number of sessions fetched per store round trip.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Resolves sessions and rosters from a [`SessionStore`].
pub struct SessionResolver<'s, S: ?Sized> {
    store: &'s S,
    page_size: usize,
}

impl<'s, S: SessionStore + ?Sized> SessionResolver<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self::with_page_size(store, DEFAULT_PAGE_SIZE)
    }

    /// A page size of zero is treated as one.
    pub fn with_page_size(store: &'s S, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Lazily yields every session inside `range`, ordered by date then id.
    ///
    /// Nothing is queried until the first call to `next`. An empty window yields nothing and is
    /// not an error.
    pub fn sessions_in_range(&self, range: &DateRange) -> SessionsInRange<'s, S> {
        SessionsInRange {
            store: self.store,
            range: *range,
            page_size: self.page_size,
            page: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    /// The students enrolled in `session_id`, in roster order.
    pub fn roster_of(&self, session_id: &str) -> StoreResult<Vec<Student>> {
        self.store.roster_of(session_id)
    }
}

/// Iterator returned by [`SessionResolver::sessions_in_range`].
///
/// Holds at most one page of sessions. After a store error has been yielded the iterator is
/// finished.
pub struct SessionsInRange<'s, S: ?Sized> {
    store: &'s S,
    range: DateRange,
    page_size: usize,
    page: VecDeque<Session>,
    cursor: Option<SessionCursor>,
    exhausted: bool,
}

impl<S: SessionStore + ?Sized> SessionsInRange<'_, S> {
    fn fetch_page(&mut self) -> StoreResult<()> {
        let sessions =
            self.store
                .sessions_page(&self.range, self.cursor.as_ref(), self.page_size)?;
        debug!(
            range = %self.range,
            fetched = sessions.len(),
            "fetched session page"
        );

        if sessions.len() < self.page_size {
            self.exhausted = true;
        }
        match sessions.last() {
            Some(last) => self.cursor = Some(SessionCursor::from(last)),
            None => self.exhausted = true,
        }
        self.page.extend(sessions);
        Ok(())
    }
}

impl<S: SessionStore + ?Sized> Iterator for SessionsInRange<'_, S> {
    type Item = StoreResult<Session>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(session) = self.page.pop_front() {
                if self.range.contains(session.date) {
                    return Some(Ok(session));
                }
                warn!(
                    session_id = %session.id,
                    date = %session.date,
                    range = %self.range,
                    "store returned a session outside the requested range; skipping"
                );
                continue;
            }

            if self.exhausted {
                return None;
            }

            if let Err(err) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }
}
