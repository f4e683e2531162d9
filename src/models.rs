use crate::schema::{attendance, session_roster, sessions, students};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;
use thiserror::Error;

/// A student as known to the roster system. The export only ever reads these.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Hash)]
#[diesel(table_name = students)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A single scheduled class meeting.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Session {
    pub id: String,
    pub date: NaiveDate,
    pub course_id: String,
}

/// One slot of a session's roster snapshot. `position` fixes the roster order.
#[derive(Insertable, Debug)]
#[diesel(table_name = session_roster)]
pub struct RosterEntry<'a> {
    pub session_id: &'a str,
    pub student_id: &'a str,
    pub position: i32,
}

/// A recorded mark for one student in one session.
///
/// `(session_id, student_id)` is the primary key, so there is at most one record per pair.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = attendance)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AttendanceRecord {
    pub session_id: String,
    pub student_id: String,
    pub status: Status,
    pub updated_at: NaiveDateTime,
}

/// The attendance status of a student for a session.
///
/// [`Status::Unknown`] is never stored: it marks a row whose lookup failed during an export.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Absent,
    Excused,
    Unmarked,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Absent => "absent",
            Status::Excused => "excused",
            Status::Unmarked => "unmarked",
            Status::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unrecognized attendance status `{0}`")]
pub struct ParseStatusError(String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Status::Present),
            "absent" => Ok(Status::Absent),
            "excused" => Ok(Status::Excused),
            "unmarked" => Ok(Status::Unmarked),
            "unknown" => Ok(Status::Unknown),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl ToSql<Text, Sqlite> for Status {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for Status {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(raw.parse()?)
    }
}

/// One flattened `(session, student, status)` line of the export. Never persisted.
///
/// Field order and the serde names are the CSV column order and header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
#[serde(rename_all = "PascalCase")]
pub struct ExportRow {
    #[tabled(rename = "SessionDate")]
    pub session_date: NaiveDate,
    #[tabled(rename = "SessionId")]
    pub session_id: String,
    #[tabled(rename = "StudentName")]
    pub student_name: String,
    #[tabled(rename = "StudentEmail")]
    pub student_email: String,
    #[tabled(rename = "Status")]
    pub status: Status,
}

impl ExportRow {
    pub fn new(session: &Session, student: &Student, status: Status) -> Self {
        Self {
            session_date: session.date,
            session_id: session.id.clone(),
            student_name: student.name.clone(),
            student_email: student.email.clone(),
            status,
        }
    }
}
