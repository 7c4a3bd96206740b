//! The seam between the record pipeline and an EVTX decoder.
//!
//! A decoder turns an open byte stream into an [`EventLog`]: a lazy, single pass sequence of
//! [`EventRecord`]s plus whatever the decoder learned about the file while producing them.

use crate::err::DecodeError;
use crate::event_record::EventRecord;

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom};

pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

pub trait EventDecoder {
    /// Fails with [`DecodeError::InvalidSignature`] when the stream is not an EVTX file.
    fn open(&self, stream: Box<dyn ReadSeek>) -> Result<Box<dyn EventLog>, DecodeError>;
}

pub trait EventLog {
    /// Records in file order.
    ///
    /// Records which cannot be decoded are accumulated into [`EventLog::errors`] rather than
    /// yielded; an `Err` item means the rest of the file cannot be read.
    fn records(&mut self) -> Box<dyn Iterator<Item = Result<EventRecord, DecodeError>> + '_>;

    /// Record number to error message, for records the decoder could not reconstruct.
    fn errors(&self) -> &BTreeMap<u64, String>;

    /// Event id to number of decoded records carrying it.
    fn event_id_counts(&self) -> &BTreeMap<u32, u64>;

    /// Human readable description of the container itself.
    fn summary(&self) -> String;
}

/// Rewinds `stream` to its start, handy for decoders that sniff a header first.
pub(crate) fn rewind(stream: &mut dyn ReadSeek) -> io::Result<()> {
    stream.seek(SeekFrom::Start(0)).map(drop)
}
