#![allow(dead_code)]
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use evtx_csv::err::DecodeError;
use evtx_csv::{CsvSink, EventDecoder, EventLog, EventRecord, ReadSeek, TimestampFormat};

use std::sync::Once;

static LOGGER_INIT: Once = Once::new();

/// Signature of the line based test format understood by [`LineDecoder`].
pub const LINE_LOG_MAGIC: &[u8] = b"LINELOG\n";

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}

/// Writes a file understood by [`LineDecoder`], one record per event id.
pub fn write_line_log(dir: &Path, name: &str, event_ids: &[u32]) -> PathBuf {
    let mut content = LINE_LOG_MAGIC.to_vec();
    for event_id in event_ids {
        content.extend_from_slice(format!("{}\n", event_id).as_bytes());
    }

    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Writes a file which is large enough to hold an EVTX header, without the signature.
pub fn write_garbage(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![b'A'; 70_000]).unwrap();
    path
}

pub fn memory_sink() -> CsvSink<Vec<u8>> {
    CsvSink::from_writer(vec![], TimestampFormat::default())
}

pub fn sink_output(sink: CsvSink<Vec<u8>>) -> String {
    String::from_utf8(sink.into_inner().unwrap()).unwrap()
}

/// Event ids of the rows of a CSV document, skipping the header.
pub fn event_id_column(csv: &str) -> Vec<u32> {
    csv.lines()
        .skip(1)
        .map(|line| line.split(',').nth(1).unwrap().parse().unwrap())
        .collect()
}

/// Decodes [`write_line_log`] files: the signature line followed by one event id per line.
///
/// A line which is not a number is reported as a decoder error for its record. A number followed
/// by `!` yields a record whose payload is not well formed XML.
pub struct LineDecoder;

pub struct LineLog {
    records: Vec<EventRecord>,
    errors: BTreeMap<u64, String>,
    counts: BTreeMap<u32, u64>,
}

impl EventDecoder for LineDecoder {
    fn open(&self, mut stream: Box<dyn ReadSeek>) -> Result<Box<dyn EventLog>, DecodeError> {
        let mut content = vec![];
        stream.read_to_end(&mut content)?;

        let Some(body) = content.strip_prefix(LINE_LOG_MAGIC) else {
            return Err(DecodeError::InvalidSignature {
                message: "missing LINELOG signature".to_string(),
            });
        };

        let mut log = LineLog {
            records: vec![],
            errors: BTreeMap::new(),
            counts: BTreeMap::new(),
        };

        for (i, line) in String::from_utf8_lossy(body).lines().enumerate() {
            let record_number = i as u64 + 1;
            let (line, malformed) = match line.trim().strip_suffix('!') {
                Some(line) => (line, true),
                None => (line.trim(), false),
            };

            match line.parse::<u32>() {
                Ok(event_id) => {
                    let time = jiff::Timestamp::from_second(1_704_067_200 + i as i64).unwrap();
                    let payload = if malformed {
                        "<EventData><Data>".to_string()
                    } else {
                        format!(
                            r#"<EventData><Data Name="Line">{}</Data></EventData>"#,
                            record_number
                        )
                    };
                    log.records
                        .push(EventRecord::new(record_number, event_id, time, payload));
                    *log.counts.entry(event_id).or_insert(0) += 1;
                }
                Err(e) => {
                    log.errors.insert(record_number, e.to_string());
                }
            }
        }

        Ok(Box::new(log))
    }
}

impl EventLog for LineLog {
    fn records(&mut self) -> Box<dyn Iterator<Item = Result<EventRecord, DecodeError>> + '_> {
        Box::new(self.records.drain(..).map(Ok))
    }

    fn errors(&self) -> &BTreeMap<u64, String> {
        &self.errors
    }

    fn event_id_counts(&self) -> &BTreeMap<u32, u64> {
        &self.counts
    }

    fn summary(&self) -> String {
        format!("Records: {}", self.records.len())
    }
}
