use crate::err::SinkError;
use crate::event_record::EventRecord;
use crate::utils::TimestampFormat;

use log::{debug, trace};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column names, in output order.
pub const CSV_HEADER: [&str; 7] = [
    "TimeCreated",
    "EventId",
    "Provider",
    "Channel",
    "Computer",
    "Payload",
    "SourceFile",
];

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    time_created: String,
    event_id: u32,
    provider: &'a str,
    channel: &'a str,
    computer: &'a str,
    payload: &'a str,
    source_file: String,
}

/// Streams accepted records into a CSV document.
///
/// The underlying writer is flushed and released on [`CsvSink::close`], or when the sink is
/// dropped on an error path.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    timestamp_format: TimestampFormat,
    header_written: bool,
    rows_written: u64,
}

impl CsvSink<BufWriter<File>> {
    /// Creates (or truncates) the output file at `path`.
    pub fn create(
        path: impl AsRef<Path>,
        timestamp_format: TimestampFormat,
    ) -> Result<Self, SinkError> {
        let path = path.as_ref();

        if path.is_dir() {
            return Err(SinkError::Open {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "a directory exists at the output path",
                ),
            });
        }

        let file = File::create(path).map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Opened CSV output at `{}`", path.display());
        Ok(Self::from_writer(BufWriter::new(file), timestamp_format))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(writer: W, timestamp_format: TimestampFormat) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        CsvSink {
            writer,
            timestamp_format,
            header_written: false,
            rows_written: 0,
        }
    }

    /// Writes the header row. Only the first call has an effect.
    pub fn write_header(&mut self) -> Result<(), SinkError> {
        if self.header_written {
            return Ok(());
        }

        self.writer
            .write_record(CSV_HEADER)
            .map_err(|source| SinkError::Header { source })?;
        self.header_written = true;

        Ok(())
    }

    pub fn write(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        let record_number = record.record_number();

        let time_created = self
            .timestamp_format
            .format(record.time_created)
            .map_err(|source| SinkError::Timestamp {
                record_number,
                source,
            })?;

        let row = CsvRow {
            time_created,
            event_id: record.event_id,
            provider: &record.provider,
            channel: &record.channel,
            computer: &record.computer,
            payload: &record.payload,
            source_file: record.source_file.to_string_lossy().into_owned(),
        };

        trace!("Writing record {}", record_number);
        self.writer
            .serialize(row)
            .map_err(|source| SinkError::Write {
                record_number,
                source,
            })?;
        self.rows_written += 1;

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer
            .flush()
            .map_err(|source| SinkError::Flush { source })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flushes any buffered rows and releases the sink.
    pub fn close(self) -> Result<(), SinkError> {
        self.into_inner().map(drop)
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, SinkError> {
        let mut inner = self.writer.into_inner().map_err(|e| SinkError::Flush {
            source: std::io::Error::new(e.error().kind(), e.error().to_string()),
        })?;
        inner
            .flush()
            .map_err(|source| SinkError::Flush { source })?;

        Ok(inner)
    }
}
