use crate::evtx_filter::FilterConfig;

use log::{Level, error, info, log};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything learned while processing a single file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileResult {
    pub path: PathBuf,
    pub records_written: u64,
    /// Records which were decoded but could not be normalized or written.
    pub record_errors: BTreeMap<u64, String>,
    /// Records which the decoder itself failed on.
    pub decoder_errors: BTreeMap<u64, String>,
    /// Event ids of the records which made it into the output.
    pub event_id_counts: BTreeMap<u32, u64>,
    /// Event ids of every record the decoder produced, filtered or not.
    pub decoder_event_id_counts: BTreeMap<u32, u64>,
    pub log_summary: String,
    /// Set when the decoder stopped before the end of the file.
    pub aborted: Option<String>,
}

impl FileResult {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileResult {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn error_count(&self) -> usize {
        self.decoder_errors.len() + self.record_errors.len()
    }

    /// The per-file report, in logging order.
    ///
    /// The decoder's event id table is only part of it with `show_metrics`, and is limited to the
    /// ids the filter would let through.
    pub fn report(&self, filter: &FilterConfig, show_metrics: bool) -> Vec<(Level, String)> {
        let mut lines = vec![];

        if let Some(reason) = &self.aborted {
            lines.push((
                Level::Error,
                format!("Reading '{}' stopped early: {}", self.path.display(), reason),
            ));
        }

        lines.push((Level::Info, format!("Event log details\n{}", self.log_summary)));
        lines.push((
            Level::Info,
            format!(
                "Records written: {} Errors: {}",
                self.records_written,
                self.error_count()
            ),
        ));

        for (title, errors) in [
            ("Decoder errors", &self.decoder_errors),
            ("Record errors", &self.record_errors),
        ] {
            if errors.is_empty() {
                continue;
            }

            lines.push((Level::Warn, title.to_string()));
            for (record_number, message) in errors {
                lines.push((
                    Level::Info,
                    format!("Record #{}: Error: {}", record_number, message),
                ));
            }
        }

        if !show_metrics {
            return lines;
        }

        let table = filtered_event_ids(&self.decoder_event_id_counts, filter);
        if table.is_empty() {
            return lines;
        }

        lines.push((Level::Info, "Metrics (including dropped events)".to_string()));
        lines.push((Level::Info, "Event Id\tCount".to_string()));
        for (event_id, count) in table {
            lines.push((Level::Info, format!("{}\t\t{}", event_id, count)));
        }

        lines
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Processed(FileResult),
    Missing,
    /// The file does not carry an EVTX signature.
    NotEvtx(String),
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetrics {
    pub files_processed: usize,
    /// Files with at least one decoder error, and how many.
    pub error_files: BTreeMap<PathBuf, usize>,
    /// Files with records which decoded but could not be normalized or written, and how many.
    pub record_error_files: BTreeMap<PathBuf, usize>,
    pub per_file_record_counts: BTreeMap<PathBuf, u64>,
    pub per_file_event_id_counts: BTreeMap<PathBuf, BTreeMap<u32, u64>>,
    /// Files which were passed over, with the reason.
    pub skipped_files: BTreeMap<PathBuf, String>,
    pub failed_files: BTreeMap<PathBuf, String>,
    pub records_written: u64,
    pub elapsed: Duration,
}

impl RunMetrics {
    pub fn record(&mut self, path: &Path, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Processed(result) => {
                self.files_processed += 1;
                self.records_written += result.records_written;

                if !result.decoder_errors.is_empty() {
                    self.error_files
                        .insert(path.to_path_buf(), result.decoder_errors.len());
                }
                if !result.record_errors.is_empty() {
                    self.record_error_files
                        .insert(path.to_path_buf(), result.record_errors.len());
                }
                if let Some(reason) = result.aborted {
                    self.failed_files.insert(path.to_path_buf(), reason);
                }

                self.per_file_record_counts
                    .insert(path.to_path_buf(), result.records_written);
                self.per_file_event_id_counts
                    .insert(path.to_path_buf(), result.event_id_counts);
            }
            FileOutcome::Missing => {
                self.skipped_files
                    .insert(path.to_path_buf(), "file does not exist".to_string());
            }
            FileOutcome::NotEvtx(reason) => {
                self.skipped_files.insert(path.to_path_buf(), reason);
            }
            FileOutcome::Failed(reason) => {
                self.failed_files.insert(path.to_path_buf(), reason);
            }
        }
    }
}

pub fn log_file_report(result: &FileResult, filter: &FilterConfig, show_metrics: bool) {
    for (level, line) in result.report(filter, show_metrics) {
        log!(level, "{}", line);
    }
}

pub fn filtered_event_ids(
    counts: &BTreeMap<u32, u64>,
    filter: &FilterConfig,
) -> Vec<(u32, u64)> {
    counts
        .iter()
        .filter(|(event_id, _)| filter.accepts_event_id(**event_id))
        .map(|(event_id, count)| (*event_id, *count))
        .collect()
}

pub fn log_run_summary(metrics: &RunMetrics) {
    let suffix = if metrics.files_processed == 1 { "" } else { "s" };
    info!(
        "Processed {} file{} in {:.4} seconds",
        metrics.files_processed,
        suffix,
        metrics.elapsed.as_secs_f64()
    );
    info!("Records written: {}", metrics.records_written);

    for (path, reason) in &metrics.skipped_files {
        info!("Skipped '{}': {}", path.display(), reason);
    }

    for (path, reason) in &metrics.failed_files {
        error!("Failed '{}': {}", path.display(), reason);
    }

    if !metrics.error_files.is_empty() {
        error!("Files with errors");
        for (path, count) in &metrics.error_files {
            info!("'{}' error count: {}", path.display(), count);
        }
    }

    if !metrics.record_error_files.is_empty() {
        error!("Files with records which could not be exported");
        for (path, count) in &metrics.record_error_files {
            info!("'{}' record error count: {}", path.display(), count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashSet;
    use pretty_assertions::assert_eq;

    fn processed(path: &str, written: u64, decoder_errors: &[u64]) -> FileResult {
        let mut result = FileResult::new(path);
        result.records_written = written;
        result.event_id_counts.insert(4624, written);
        for record_number in decoder_errors {
            result
                .decoder_errors
                .insert(*record_number, "bad record".to_string());
        }
        result
    }

    #[test]
    fn test_metrics_aggregate_outcomes() {
        let mut metrics = RunMetrics::default();

        metrics.record(
            Path::new("a.evtx"),
            FileOutcome::Processed(processed("a.evtx", 3, &[])),
        );
        metrics.record(
            Path::new("b.evtx"),
            FileOutcome::NotEvtx("invalid signature".to_string()),
        );
        metrics.record(
            Path::new("c.evtx"),
            FileOutcome::Processed(processed("c.evtx", 2, &[5, 9])),
        );
        metrics.record(Path::new("d.evtx"), FileOutcome::Missing);
        metrics.record(
            Path::new("e.evtx"),
            FileOutcome::Failed("access denied".to_string()),
        );

        assert_eq!(metrics.files_processed, 2);
        assert_eq!(metrics.records_written, 5);
        assert_eq!(
            metrics.error_files,
            BTreeMap::from([(PathBuf::from("c.evtx"), 2)])
        );
        assert_eq!(
            metrics.skipped_files.keys().collect::<Vec<_>>(),
            vec![Path::new("b.evtx"), Path::new("d.evtx")]
        );
        assert_eq!(
            metrics.failed_files.keys().collect::<Vec<_>>(),
            vec![Path::new("e.evtx")]
        );
        assert_eq!(metrics.per_file_record_counts[Path::new("a.evtx")], 3);
    }

    #[test]
    fn test_aborted_file_is_reported_as_failed() {
        let mut result = processed("a.evtx", 1, &[]);
        result.aborted = Some("chunk is corrupt".to_string());

        let mut metrics = RunMetrics::default();
        metrics.record(Path::new("a.evtx"), FileOutcome::Processed(result));

        assert_eq!(metrics.files_processed, 1);
        assert_eq!(
            metrics.failed_files[Path::new("a.evtx")],
            "chunk is corrupt"
        );
    }

    #[test]
    fn test_event_id_table_follows_filter() {
        let counts = BTreeMap::from([(4624, 10), (4625, 2), (4688, 7)]);

        let filter =
            FilterConfig::new(HashSet::new(), HashSet::from([4625]), None, None).unwrap();
        assert_eq!(
            filtered_event_ids(&counts, &filter),
            vec![(4624, 10), (4688, 7)]
        );

        let filter =
            FilterConfig::new(HashSet::from([4688]), HashSet::from([4688]), None, None).unwrap();
        assert_eq!(filtered_event_ids(&counts, &filter), vec![(4688, 7)]);
    }

    #[test]
    fn test_payload_failures_are_not_decoder_errors() {
        let mut result = processed("a.evtx", 0, &[]);
        result
            .record_errors
            .insert(1, "malformed payload at byte 11".to_string());

        let mut metrics = RunMetrics::default();
        metrics.record(Path::new("a.evtx"), FileOutcome::Processed(result));

        assert!(metrics.error_files.is_empty());
        assert_eq!(
            metrics.record_error_files,
            BTreeMap::from([(PathBuf::from("a.evtx"), 1)])
        );
    }

    fn report_text(result: &FileResult, show_metrics: bool) -> Vec<String> {
        result
            .report(&FilterConfig::empty(), show_metrics)
            .into_iter()
            .map(|(_, line)| line)
            .collect()
    }

    #[test]
    fn test_report_without_metrics_still_lists_errors() {
        let mut result = processed("a.evtx", 2, &[3]);
        result.log_summary = "Version: 3.1".to_string();
        result.decoder_event_id_counts.insert(4624, 2);

        let lines = report_text(&result, false);

        assert_eq!(
            lines,
            vec![
                "Event log details\nVersion: 3.1".to_string(),
                "Records written: 2 Errors: 1".to_string(),
                "Decoder errors".to_string(),
                "Record #3: Error: bad record".to_string(),
            ]
        );
    }

    #[test]
    fn test_report_with_metrics_adds_the_event_id_table() {
        let mut result = processed("a.evtx", 2, &[]);
        result.decoder_event_id_counts.insert(4624, 2);

        let lines = report_text(&result, true);

        assert_eq!(
            &lines[2..],
            &[
                "Metrics (including dropped events)".to_string(),
                "Event Id\tCount".to_string(),
                "4624\t\t2".to_string(),
            ]
        );
    }
}
