use crate::acquire::{Acquired, FsAccess, RawVolumeReader, SourceAccess, acquire};
use crate::csv_sink::CsvSink;
use crate::decoder::EventDecoder;
use crate::err::{DecodeError, FatalError};
use crate::evtx_decoder::EvtxDecoder;
use crate::evtx_filter::FilterConfig;
use crate::metrics::{FileOutcome, FileResult};
use crate::payload;

use log::{debug, error, info, warn};
use std::io::Write;
use std::path::Path;

/// Drives a single source file from acquisition to the sink.
pub struct FileProcessor {
    filter: FilterConfig,
    decoder: Box<dyn EventDecoder>,
    access: Box<dyn SourceAccess>,
    raw_reader: Option<Box<dyn RawVolumeReader>>,
}

impl FileProcessor {
    pub fn new(filter: FilterConfig) -> Self {
        FileProcessor {
            filter,
            decoder: Box::new(EvtxDecoder::new()),
            access: Box::new(FsAccess),
            raw_reader: None,
        }
    }

    pub fn with_decoder(mut self, decoder: impl EventDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn with_source_access(mut self, access: impl SourceAccess + 'static) -> Self {
        self.access = Box::new(access);
        self
    }

    /// Used for files which are locked by another process.
    pub fn with_raw_reader(mut self, raw_reader: impl RawVolumeReader + 'static) -> Self {
        self.raw_reader = Some(Box::new(raw_reader));
        self
    }

    pub fn filter(&self) -> &FilterConfig {
        &self.filter
    }

    /// Writes every accepted record of `path` into `sink`.
    ///
    /// Only errors which should stop the whole run are returned as `Err`, everything else is
    /// reported through the [`FileOutcome`].
    pub fn process<W: Write>(
        &self,
        path: &Path,
        sink: &mut CsvSink<W>,
    ) -> Result<FileOutcome, FatalError> {
        if !path.exists() {
            warn!("'{}' does not exist! Skipping", path.display());
            return Ok(FileOutcome::Missing);
        }

        info!("Processing '{}'...", path.display());

        let stream = match acquire(path, self.access.as_ref(), self.raw_reader.as_deref())? {
            Acquired::Stream(stream) => stream,
            Acquired::Unavailable(e) => {
                error!("Unable to open '{}': {}", path.display(), e);
                return Ok(FileOutcome::Failed(e.to_string()));
            }
        };

        let mut log = match self.decoder.open(stream) {
            Ok(log) => log,
            Err(DecodeError::InvalidSignature { message }) => {
                info!(
                    "'{}' is not an evtx file! Message: {} Skipping...",
                    path.display(),
                    message
                );
                return Ok(FileOutcome::NotEvtx(message));
            }
            Err(e) => {
                error!("Error processing '{}'! Message: {}", path.display(), e);
                return Ok(FileOutcome::Failed(e.to_string()));
            }
        };

        let mut result = FileResult::new(path);

        for item in log.records() {
            let mut record = match item {
                Ok(record) => record,
                Err(e) => {
                    error!("Error reading '{}': {}", path.display(), e);
                    result.aborted = Some(e.to_string());
                    break;
                }
            };

            record.source_file = path.to_path_buf();

            if !self.filter.accepts(&record) {
                continue;
            }

            let record_number = record.record_number();

            match payload::normalize(&record.payload) {
                Ok(flattened) => record.payload = flattened,
                Err(e) => {
                    error!("Error processing record #{}: {}", record_number, e);
                    result.record_errors.insert(record_number, e.to_string());
                    continue;
                }
            }

            if let Err(e) = sink.write(&record) {
                error!("Error writing record #{}: {}", record_number, e);
                result.record_errors.insert(record_number, e.to_string());
                continue;
            }

            result.records_written += 1;
            *result.event_id_counts.entry(record.event_id).or_insert(0) += 1;
        }

        sink.flush().map_err(FatalError::Sink)?;

        result.decoder_errors = log.errors().clone();
        result.decoder_event_id_counts = log.event_id_counts().clone();
        result.log_summary = log.summary();

        debug!(
            "'{}': {} written, {} record error(s), {} decoder error(s)",
            path.display(),
            result.records_written,
            result.record_errors.len(),
            result.decoder_errors.len()
        );

        Ok(FileOutcome::Processed(result))
    }
}
