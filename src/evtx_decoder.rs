//! [`EventDecoder`] backed by the `evtx` crate.

use crate::decoder::{EventDecoder, EventLog, ReadSeek, rewind};
use crate::err::DecodeError;
use crate::event_record::EventRecord;

use evtx::{EvtxParser, ParserSettings};
use jiff::Timestamp;
use log::{debug, trace};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use std::fmt;

const EVTX_FILE_HEADER_MAGIC: &[u8; 8] = b"ElfFile\x00";
const EVTX_FILE_HEADER_SIZE: usize = 128;

/// Used as the payload of records which carry neither `EventData` nor `UserData`.
const EMPTY_PAYLOAD: &str = "<EventData/>";

pub struct EvtxDecoder {
    settings: ParserSettings,
}

impl Default for EvtxDecoder {
    fn default() -> Self {
        EvtxDecoder {
            settings: ParserSettings::new().indent(false),
        }
    }
}

impl EvtxDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventDecoder for EvtxDecoder {
    fn open(&self, mut stream: Box<dyn ReadSeek>) -> Result<Box<dyn EventLog>, DecodeError> {
        check_signature(&mut *stream)?;
        rewind(&mut *stream)?;

        let header = FileHeaderSummary::from_stream(&mut *stream);
        rewind(&mut *stream)?;

        let parser = EvtxParser::from_read_seek(stream)
            .map_err(classify_open_error)?
            .with_configuration(self.settings.clone());

        if let Some(header) = &header {
            debug!("EVTX header: {:?}", header);
        }

        Ok(Box::new(EvtxEventLog {
            parser,
            header,
            tally: RecordTally::default(),
        }))
    }
}

struct EvtxEventLog {
    parser: EvtxParser<Box<dyn ReadSeek>>,
    header: Option<FileHeaderSummary>,
    tally: RecordTally,
}

impl EventLog for EvtxEventLog {
    fn records(&mut self) -> Box<dyn Iterator<Item = Result<EventRecord, DecodeError>> + '_> {
        let tally = &mut self.tally;

        let records = self.parser.records().filter_map(move |result| match result {
            Ok(serialized) => {
                let fallback = header_timestamp(
                    serialized.timestamp.timestamp(),
                    serialized.timestamp.timestamp_subsec_nanos(),
                );
                tally
                    .accept(serialized.event_record_id, &serialized.data, fallback)
                    .map(Ok)
            }
            Err(e) => {
                tally.reject(error_chain(&e));
                None
            }
        });

        Box::new(records)
    }

    fn errors(&self) -> &BTreeMap<u64, String> {
        &self.tally.errors
    }

    fn event_id_counts(&self) -> &BTreeMap<u32, u64> {
        &self.tally.event_id_counts
    }

    fn summary(&self) -> String {
        match &self.header {
            Some(header) => header.to_string(),
            None => "File header unavailable".to_owned(),
        }
    }
}

/// Running per-file bookkeeping of what the parser yielded.
#[derive(Debug, Default)]
struct RecordTally {
    errors: BTreeMap<u64, String>,
    event_id_counts: BTreeMap<u32, u64>,
    last_record_number: u64,
}

impl RecordTally {
    /// Turns the rendered XML of a record into an [`EventRecord`], or notes why it could not be.
    fn accept(
        &mut self,
        record_number: u64,
        xml: &str,
        header_timestamp: Option<Timestamp>,
    ) -> Option<EventRecord> {
        self.last_record_number = self.last_record_number.max(record_number);

        match record_from_xml(record_number, xml, header_timestamp) {
            Ok(record) => {
                *self.event_id_counts.entry(record.event_id).or_insert(0) += 1;
                Some(record)
            }
            Err(message) => {
                debug!("Record {} could not be read: {}", record_number, message);
                self.note_error(record_number, message);
                None
            }
        }
    }

    /// A parser error does not name its record, it is charged to the one after the last seen.
    fn reject(&mut self, message: String) {
        self.last_record_number += 1;
        debug!(
            "Record {} failed to decode: {}",
            self.last_record_number, message
        );
        self.note_error(self.last_record_number, message);
    }

    fn note_error(&mut self, record_number: u64, message: String) {
        self.errors
            .entry(record_number)
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&message);
            })
            .or_insert(message);
    }
}

/// Converts the record header timestamp, which the parser hands out as seconds and nanoseconds.
fn header_timestamp(seconds: i64, nanos: u32) -> Option<Timestamp> {
    let nanos = i32::try_from(nanos).ok()?;
    Timestamp::new(seconds, nanos).ok()
}

/// The handful of EVTX file header fields worth reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeaderSummary {
    pub first_chunk_number: u64,
    pub last_chunk_number: u64,
    pub next_record_id: u64,
    pub minor_version: u16,
    pub major_version: u16,
    pub chunk_count: u16,
    pub flags: u32,
}

impl FileHeaderSummary {
    /// Reads the fixed part of the file header, `None` if the stream is not an EVTX file.
    pub fn from_stream(stream: &mut dyn ReadSeek) -> Option<Self> {
        let mut buf = [0_u8; EVTX_FILE_HEADER_SIZE];
        stream.read_exact(&mut buf).ok()?;
        Self::from_bytes(&buf)
    }

    pub fn from_bytes(buf: &[u8; EVTX_FILE_HEADER_SIZE]) -> Option<Self> {
        if &buf[..8] != EVTX_FILE_HEADER_MAGIC {
            return None;
        }

        let u64_at = |o: usize| u64::from_le_bytes(buf[o..o + 8].try_into().unwrap_or_default());
        let u16_at = |o: usize| u16::from_le_bytes([buf[o], buf[o + 1]]);
        let u32_at = |o: usize| u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]]);

        Some(FileHeaderSummary {
            first_chunk_number: u64_at(8),
            last_chunk_number: u64_at(16),
            next_record_id: u64_at(24),
            minor_version: u16_at(36),
            major_version: u16_at(38),
            chunk_count: u16_at(42),
            flags: u32_at(120),
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.flags & 0x1 != 0
    }

    pub fn is_full(&self) -> bool {
        self.flags & 0x2 != 0
    }
}

impl fmt::Display for FileHeaderSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version: {}.{}", self.major_version, self.minor_version)?;
        writeln!(f, "Chunk count: {}", self.chunk_count)?;
        writeln!(
            f,
            "Chunks: {} - {}",
            self.first_chunk_number, self.last_chunk_number
        )?;
        writeln!(f, "Next record id: {}", self.next_record_id)?;
        write!(
            f,
            "Flags: {}",
            match (self.is_dirty(), self.is_full()) {
                (true, true) => "Dirty, Full",
                (true, false) => "Dirty",
                (false, true) => "Full",
                (false, false) => "None",
            }
        )
    }
}

fn check_signature(stream: &mut dyn ReadSeek) -> Result<(), DecodeError> {
    let mut magic = [0_u8; 8];

    match stream.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(DecodeError::InvalidSignature {
                message: "file is too small to hold an EVTX header".to_owned(),
            });
        }
        Err(e) => return Err(e.into()),
    }

    if &magic != EVTX_FILE_HEADER_MAGIC {
        return Err(DecodeError::InvalidSignature {
            message: format!(
                "invalid EVTX file header magic, expected {:02X?}, found {:02X?}",
                EVTX_FILE_HEADER_MAGIC, magic
            ),
        });
    }

    Ok(())
}

/// Renders an error and all of its sources on one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

fn classify_open_error<E: std::error::Error>(err: E) -> DecodeError {
    let message = error_chain(&err);
    let debug = format!("{err:?}");

    if message.contains("ElfFile") || debug.contains("InvalidEvtxFileHeaderMagic") {
        DecodeError::InvalidSignature { message }
    } else {
        DecodeError::Other { message }
    }
}

#[derive(Default)]
struct SystemFields {
    event_id: Option<u32>,
    provider: Option<String>,
    channel: Option<String>,
    computer: Option<String>,
    time_created: Option<Timestamp>,
    payload: Option<String>,
}

/// Builds an [`EventRecord`] from the rendered XML of one event.
///
/// `fallback_timestamp` (the record header timestamp) is used when `TimeCreated` is missing.
pub fn record_from_xml(
    record_number: u64,
    xml: &str,
    fallback_timestamp: Option<Timestamp>,
) -> Result<EventRecord, String> {
    let fields = read_system_fields(xml)?;

    let event_id = fields
        .event_id
        .ok_or_else(|| "record has no numeric EventID".to_owned())?;
    let time_created = fields
        .time_created
        .or(fallback_timestamp)
        .ok_or_else(|| "record has no TimeCreated".to_owned())?;

    let payload = fields.payload.unwrap_or_else(|| EMPTY_PAYLOAD.to_owned());

    Ok(EventRecord::new(record_number, event_id, time_created, payload)
        .with_provider(fields.provider.unwrap_or_default())
        .with_channel(fields.channel.unwrap_or_default())
        .with_computer(fields.computer.unwrap_or_default()))
}

fn attribute_value(start: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn is_payload_element(path: &[String], name: &str) -> bool {
    path.len() == 1 && (name == "EventData" || name == "UserData")
}

fn inspect_system_element(
    start: &BytesStart<'_>,
    name: &str,
    path: &[String],
    fields: &mut SystemFields,
) {
    if path.len() != 2 || path[1] != "System" {
        return;
    }

    match name {
        "Provider" => fields.provider = attribute_value(start, b"Name"),
        "TimeCreated" => {
            fields.time_created = attribute_value(start, b"SystemTime")
                .and_then(|t| t.parse::<Timestamp>().ok())
        }
        _ => {}
    }
}

fn read_system_fields(xml: &str) -> Result<SystemFields, String> {
    let mut reader = Reader::from_str(xml);
    let mut fields = SystemFields::default();

    // Element names from the root down to the current element.
    let mut path: Vec<String> = Vec::new();
    // Byte offset and depth of the payload element, while inside it.
    let mut payload_start: Option<(usize, usize)> = None;

    loop {
        let position = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| e.to_string())?;

        match event {
            Event::Start(start) => {
                let name = local_name(&start);
                if payload_start.is_none() {
                    inspect_system_element(&start, &name, &path, &mut fields);
                    if is_payload_element(&path, &name) {
                        payload_start = Some((position, path.len()));
                    }
                }
                path.push(name);
            }
            Event::Empty(start) => {
                let name = local_name(&start);
                if payload_start.is_none() {
                    inspect_system_element(&start, &name, &path, &mut fields);
                    if is_payload_element(&path, &name) && fields.payload.is_none() {
                        let end = reader.buffer_position() as usize;
                        fields.payload = Some(xml[position..end].to_owned());
                    }
                }
            }
            Event::End(_) => {
                path.pop();
                if let Some((start, depth)) = payload_start {
                    if path.len() == depth {
                        let end = reader.buffer_position() as usize;
                        fields.payload.get_or_insert_with(|| xml[start..end].to_owned());
                        payload_start = None;
                    }
                }
            }
            Event::Text(text)
                if payload_start.is_none() && path.len() == 3 && path[1] == "System" =>
            {
                let text = text.unescape().map_err(|e| e.to_string())?;
                let value = text.trim();
                match path[2].as_str() {
                    "EventID" => fields.event_id = value.parse().ok(),
                    "Channel" => fields.channel = Some(value.to_owned()),
                    "Computer" => fields.computer = Some(value.to_owned()),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    trace!("System fields read, payload present: {}", fields.payload.is_some());
    Ok(fields)
}
