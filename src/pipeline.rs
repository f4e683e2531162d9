//! Drives resolver → joiner → encoder into a byte sink.

use crate::encoder::CsvEncoder;
use crate::joiner::{AttendanceJoiner, LookupFailures};
use crate::models::ExportRow;
use crate::range::DateRange;
use crate::resolver::{DEFAULT_PAGE_SIZE, SessionResolver};
use crate::store::{ExportStore, StoreError};
use std::io::{self, Write};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why an export stopped before the end of the report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode export row: {0}")]
    Encode(csv::Error),

    #[error("failed to write export: {0}")]
    Io(#[from] io::Error),

    #[error("export receiver went away")]
    Disconnected,

    #[error("export exceeded its {0:?} time limit")]
    TimedOut(Duration),
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(source) if source.kind() == io::ErrorKind::BrokenPipe => {
                PipelineError::Disconnected
            }
            _ => PipelineError::Encode(err),
        }
    }
}

/// Knobs for a single export run.
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    /// Sessions fetched per store round trip.
    pub page_size: usize,
    /// Bytes the encoder buffers before writing to the sink.
    pub chunk_size: usize,
    /// Stop with [`PipelineError::TimedOut`] once this much time has passed.
    pub timeout: Option<Duration>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: 8 * 1024,
            timeout: None,
        }
    }
}

/// What a completed export produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    pub failed_lookups: usize,
    pub elapsed: Duration,
}

/// Lazily yields the export rows for `range`.
///
/// `failures` is incremented for each lookup that had to be reported as unknown.
pub fn rows<'s, S: ExportStore + ?Sized>(
    resolver: &'s SessionResolver<'s, S>,
    store: &'s S,
    range: &DateRange,
    failures: LookupFailures,
) -> impl Iterator<Item = Result<ExportRow, StoreError>> + 's {
    AttendanceJoiner::new(resolver, store, range, failures)
}

/// Writes the full CSV report for `range` to `sink`.
///
/// Rows are pulled one at a time and handed to the encoder, so memory stays bounded by one
/// roster plus one page of sessions. On error the sink holds only the chunks flushed before it.
pub fn export<S, W>(
    store: &S,
    range: &DateRange,
    options: &ExportOptions,
    sink: W,
) -> Result<ExportSummary, PipelineError>
where
    S: ExportStore + ?Sized,
    W: Write,
{
    let started = Instant::now();
    let deadline = options.timeout.map(|limit| (started + limit, limit));

    let failures = LookupFailures::default();
    let resolver = SessionResolver::with_page_size(store, options.page_size);
    let mut encoder = CsvEncoder::with_capacity(sink, options.chunk_size)?;

    for row in rows(&resolver, store, range, failures.clone()) {
        if let Some((deadline, limit)) = deadline
            && Instant::now() >= deadline
        {
            return Err(PipelineError::TimedOut(limit));
        }
        encoder.encode(&row?)?;
    }

    let written = encoder.finish()?;
    Ok(ExportSummary {
        rows: written,
        failed_lookups: failures.count(),
        elapsed: started.elapsed(),
    })
}
