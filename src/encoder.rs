//! CSV encoding of export rows.

use crate::models::ExportRow;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::cell::Cell;
use std::io::{self, Write};
use std::rc::Rc;

/// The header row, in column order.
pub const HEADER: [&str; 5] = [
    "SessionDate",
    "SessionId",
    "StudentName",
    "StudentEmail",
    "Status",
];

/// Writes export rows to `W` as CSV, one record per row.
///
/// The header is written on construction so an export with no rows is still a valid file.
/// Records end in CRLF. Fields containing a comma, a double quote or a line break are quoted
/// and inner quotes doubled.
///
/// Output is buffered; dropping an encoder without calling [`CsvEncoder::finish`] discards
/// whatever has not reached `W` yet.
pub struct CsvEncoder<W: Write> {
    writer: csv::Writer<Gate<W>>,
    open: Rc<Cell<bool>>,
    rows: usize,
}

impl<W: Write> CsvEncoder<W> {
    pub fn new(sink: W) -> Result<Self, csv::Error> {
        Self::start(WriterBuilder::new(), sink)
    }

    /// Like [`CsvEncoder::new`], but only hands bytes to `sink` once `capacity` are buffered.
    pub fn with_capacity(sink: W, capacity: usize) -> Result<Self, csv::Error> {
        let mut builder = WriterBuilder::new();
        builder.buffer_capacity(capacity.max(1));
        Self::start(builder, sink)
    }

    fn start(mut builder: WriterBuilder, sink: W) -> Result<Self, csv::Error> {
        let open = Rc::new(Cell::new(true));
        let mut writer = builder
            .has_headers(false)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::CRLF)
            .from_writer(Gate {
                inner: sink,
                open: Rc::clone(&open),
            });
        writer.write_record(HEADER)?;
        Ok(Self {
            writer,
            open,
            rows: 0,
        })
    }

    pub fn encode(&mut self, row: &ExportRow) -> Result<(), csv::Error> {
        self.writer.serialize(row)?;
        self.rows += 1;
        Ok(())
    }

    /// Flushes everything to the sink and returns the number of data rows written.
    pub fn finish(mut self) -> Result<usize, csv::Error> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

impl<W: Write> Drop for CsvEncoder<W> {
    fn drop(&mut self) {
        // csv::Writer flushes on drop; an abandoned export must not leak a partial buffer.
        self.open.set(false);
    }
}

/// Passes writes through to `inner` until closed, then swallows them.
struct Gate<W> {
    inner: W,
    open: Rc<Cell<bool>>,
}

impl<W: Write> Write for Gate<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.open.get() {
            self.inner.write(buf)
        } else {
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.open.get() {
            self.inner.flush()
        } else {
            Ok(())
        }
    }
}
