use crate::models::{AttendanceRecord, RosterEntry, Session, Status, Student};
use crate::range::DateRange;
use crate::schema;
use crate::store::{AttendanceStore, SessionCursor, SessionStore, StoreResult};
use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, warn};

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
type SqlitePooled = PooledConnection<ConnectionManager<SqliteConnection>>;

/// The schema every store starts from.
const SCHEMA: &str = include_str!("../migrations/2025-08-25-000000_create_tables/up.sql");

/// Applied to every pooled connection as it is handed out.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// The SQLite-backed store for sessions, rosters and attendance.
///
/// Every query checks a connection out of the pool and returns it when done, so concurrent
/// exports read in parallel and nothing is held open between queries.
#[derive(Clone)]
pub struct AttendanceManager {
    pool: SqlitePool,
}

impl AttendanceManager {
    /// Opens a pool of `pool_size` connections to the SQLite database at `database_url`.
    pub fn connect(database_url: &str, pool_size: u32) -> StoreResult<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)?;

        debug!(database_url, pool_size, "connected to attendance store");
        Ok(Self { pool })
    }

    fn conn(&self) -> StoreResult<SqlitePooled> {
        Ok(self.pool.get()?)
    }

    /// Creates any missing tables. Safe to run against an existing database.
    pub fn setup(&self) -> StoreResult<()> {
        self.conn()?.batch_execute(SCHEMA)?;
        Ok(())
    }

    /// Inserts students into the roster system.
    pub fn insert_students(&self, new_students: &[Student]) -> StoreResult<usize> {
        let inserted = diesel::insert_into(schema::students::table)
            .values(new_students)
            .execute(&mut self.conn()?)?;
        Ok(inserted)
    }

    /// Schedules a session together with its roster snapshot. `roster` order is preserved.
    pub fn schedule_session(&self, session: &Session, roster: &[&str]) -> StoreResult<()> {
        let entries: Vec<RosterEntry> = roster
            .iter()
            .zip(0..)
            .map(|(student_id, position)| RosterEntry {
                session_id: &session.id,
                student_id,
                position,
            })
            .collect();

        self.conn()?.transaction(|conn| {
            diesel::insert_into(schema::sessions::table)
                .values(session)
                .execute(conn)?;
            diesel::insert_into(schema::session_roster::table)
                .values(&entries)
                .execute(conn)?;
            Ok::<_, diesel::result::Error>(())
        })?;
        Ok(())
    }

    /// For a given session, mark all of the given students with the given [`Status`]. If that
    /// record already exists, this will update that [`Status`].
    ///
    /// Students who are not on the session's roster are skipped. Returns the number of records
    /// written.
    pub fn mark(&self, session: &str, student_ids: &[&str], status: Status) -> StoreResult<usize> {
        let roster = self.roster_of(session)?;
        let now = Utc::now().naive_utc();

        let records: Vec<AttendanceRecord> = student_ids
            .iter()
            .filter(|&&id| {
                let enrolled = roster.iter().any(|s| s.id == id);
                if !enrolled {
                    warn!(
                        session,
                        student_id = id,
                        %status,
                        "tried to mark a student who is not on the roster"
                    );
                }
                enrolled
            })
            .map(|id| AttendanceRecord {
                session_id: session.to_string(),
                student_id: id.to_string(),
                status,
                updated_at: now,
            })
            .collect();

        let written = diesel::replace_into(schema::attendance::table)
            .values(&records)
            .execute(&mut self.conn()?)?;
        Ok(written)
    }
}

impl SessionStore for AttendanceManager {
    fn sessions_page(
        &self,
        range: &DateRange,
        after: Option<&SessionCursor>,
        limit: usize,
    ) -> StoreResult<Vec<Session>> {
        use schema::sessions::dsl::*;

        let mut query = sessions
            .select(Session::as_select())
            .filter(date.between(range.start(), range.end()))
            .into_boxed();

        if let Some(cursor) = after {
            query = query.filter(
                date.gt(cursor.date)
                    .or(date.eq(cursor.date).and(id.gt(cursor.id.as_str()))),
            );
        }

        let page = query
            .order((date.asc(), id.asc()))
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .load(&mut self.conn()?)?;
        Ok(page)
    }

    fn roster_of(&self, session: &str) -> StoreResult<Vec<Student>> {
        use schema::session_roster::dsl::*;

        let roster = session_roster
            .inner_join(schema::students::table)
            .filter(session_id.eq(session))
            .order(position.asc())
            .select(Student::as_select())
            .load(&mut self.conn()?)?;
        Ok(roster)
    }
}

impl AttendanceStore for AttendanceManager {
    fn attendance_of(&self, session: &str, student: &str) -> StoreResult<Option<Status>> {
        use schema::attendance::dsl::*;

        let recorded = attendance
            .find((session, student))
            .select(status)
            .first::<Status>(&mut self.conn()?)
            .optional()?;
        Ok(recorded)
    }
}
