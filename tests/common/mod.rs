#![allow(dead_code)]

use attendance_export::auth::{AuthError, Authorizer, Principal};
use attendance_export::models::{Session, Status, Student};
use attendance_export::range::DateRange;
use attendance_export::store::{AttendanceStore, SessionCursor, SessionStore, StoreError, StoreResult};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn day(d: &str) -> NaiveDate {
    NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()
}

pub fn student(id: &str, name: &str) -> Student {
    Student {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{id}@campus.edu"),
    }
}

/// An in-memory store that counts every call and can be told to fail.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Vec<Session>,
    rosters: HashMap<String, Vec<Student>>,
    records: HashMap<(String, String), Status>,
    /// Page requests from this one on (1-based) fail.
    fail_from_page: Option<usize>,
    /// Page requests from this one on (1-based) panic.
    panic_from_page: Option<usize>,
    lookups_unreachable: bool,
    pages: AtomicUsize,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn session(mut self, id: &str, date: &str, roster: &[Student]) -> Self {
        self.sessions.push(Session {
            id: id.to_string(),
            date: day(date),
            course_id: "rust-101".to_string(),
        });
        self.sessions
            .sort_by(|a, b| (a.date, &a.id).cmp(&(b.date, &b.id)));
        self.rosters.insert(id.to_string(), roster.to_vec());
        self
    }

    pub fn record(mut self, session: &str, student: &str, status: Status) -> Self {
        self.records
            .insert((session.to_string(), student.to_string()), status);
        self
    }

    pub fn failing_from_page(mut self, page: usize) -> Self {
        self.fail_from_page = Some(page);
        self
    }

    pub fn panicking_from_page(mut self, page: usize) -> Self {
        self.panic_from_page = Some(page);
        self
    }

    pub fn with_unreachable_lookups(mut self) -> Self {
        self.lookups_unreachable = true;
        self
    }

    /// Every store call made so far.
    pub fn calls(&self) -> usize {
        self.pages.load(Ordering::SeqCst) + self.lookups.load(Ordering::SeqCst)
    }
}

impl SessionStore for MemoryStore {
    fn sessions_page(
        &self,
        range: &DateRange,
        after: Option<&SessionCursor>,
        limit: usize,
    ) -> StoreResult<Vec<Session>> {
        let page = self.pages.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from_page.is_some_and(|n| page >= n) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        if self.panic_from_page.is_some_and(|n| page >= n) {
            panic!("session page {page} blew up");
        }

        Ok(self
            .sessions
            .iter()
            .filter(|s| range.contains(s.date))
            .filter(|s| after.is_none_or(|c| (s.date, s.id.as_str()) > (c.date, c.id.as_str())))
            .take(limit)
            .cloned()
            .collect())
    }

    fn roster_of(&self, session_id: &str) -> StoreResult<Vec<Student>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.rosters.get(session_id).cloned().unwrap_or_default())
    }
}

impl AttendanceStore for MemoryStore {
    fn attendance_of(&self, session_id: &str, student_id: &str) -> StoreResult<Option<Status>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.lookups_unreachable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(self
            .records
            .get(&(session_id.to_string(), student_id.to_string()))
            .copied())
    }
}

/// Accepts `<role>-token` for any role except `broken`.
pub struct StubAuthorizer;

impl Authorizer for StubAuthorizer {
    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        match token.strip_suffix("-token") {
            Some(role) if role != "broken" => Ok(Principal {
                subject: format!("{role}-user"),
                role: role.to_string(),
            }),
            _ => Err(AuthError::InvalidToken("unknown token".into())),
        }
    }
}
