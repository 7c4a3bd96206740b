use crate::csv_sink::CsvSink;
use crate::err::FatalError;
use crate::file_processor::FileProcessor;
use crate::metrics::{self, FileOutcome, RunMetrics};
use crate::utils::TimestampFormat;

use log::debug;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Processes a batch of files into a single CSV output.
pub struct Run {
    processor: FileProcessor,
    show_metrics: bool,
}

impl Run {
    pub fn new(processor: FileProcessor) -> Self {
        Run {
            processor,
            show_metrics: true,
        }
    }

    pub fn show_metrics(mut self, show_metrics: bool) -> Self {
        self.show_metrics = show_metrics;
        self
    }

    /// Processes `paths` in order into `sink`.
    ///
    /// A file which cannot be processed is recorded in the returned metrics and the run moves on
    /// to the next one. Only a [`FatalError`] stops the run.
    pub fn execute<W, I, P>(&self, paths: I, sink: &mut CsvSink<W>) -> Result<RunMetrics, FatalError>
    where
        W: Write,
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let start = Instant::now();
        let mut metrics = RunMetrics::default();

        sink.write_header().map_err(FatalError::Sink)?;

        for path in paths {
            let path = path.as_ref();
            let outcome = self.processor.process(path, sink)?;

            if let FileOutcome::Processed(result) = &outcome {
                metrics::log_file_report(result, self.processor.filter(), self.show_metrics);
            }

            metrics.record(path, outcome);
        }

        metrics.elapsed = start.elapsed();
        metrics::log_run_summary(&metrics);

        Ok(metrics)
    }

    /// Like [`Run::execute`], writing into a new file at `destination`.
    pub fn execute_to_path<I, P>(
        &self,
        paths: I,
        destination: &Path,
        timestamp_format: TimestampFormat,
    ) -> Result<RunMetrics, FatalError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut sink =
            CsvSink::create(destination, timestamp_format).map_err(FatalError::SinkOpen)?;

        let metrics = self.execute(paths, &mut sink)?;

        debug!(
            "Closing '{}' after {} row(s)",
            destination.display(),
            sink.rows_written()
        );
        sink.close().map_err(FatalError::Sink)?;

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evtx_filter::FilterConfig;

    #[test]
    fn test_unwritable_destination_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(FileProcessor::new(FilterConfig::empty()));

        let err = run
            .execute_to_path(Vec::<&Path>::new(), dir.path(), TimestampFormat::default())
            .unwrap_err();

        assert!(matches!(err, FatalError::SinkOpen(_)));
    }

    #[test]
    fn test_empty_run_writes_only_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.csv");
        let run = Run::new(FileProcessor::new(FilterConfig::empty()));

        let metrics = run
            .execute_to_path(Vec::<&Path>::new(), &destination, TimestampFormat::default())
            .unwrap();

        assert_eq!(metrics.files_processed, 0);
        assert_eq!(
            std::fs::read_to_string(destination).unwrap(),
            "TimeCreated,EventId,Provider,Channel,Computer,Payload,SourceFile\n"
        );
    }
}
