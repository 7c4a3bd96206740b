#![deny(unused_must_use)]
#![forbid(unsafe_code)]
// Don't allow dbg! prints in release.
#![cfg_attr(not(debug_assertions), deny(clippy::dbg_macro))]

pub use acquire::{Acquisition, FsAccess, RawVolumeReader, SourceAccess};
pub use csv_sink::{CSV_HEADER, CsvSink};
pub use decoder::{EventDecoder, EventLog, ReadSeek};
pub use event_record::EventRecord;
pub use evtx_decoder::EvtxDecoder;
pub use evtx_filter::FilterConfig;
pub use file_processor::FileProcessor;
pub use metrics::{FileOutcome, FileResult, RunMetrics};
pub use run::Run;
pub use utils::{DEFAULT_TIMESTAMP_FORMAT, TimestampFormat};

pub mod acquire;
pub mod csv_sink;
pub mod decoder;
pub mod err;
pub mod evtx_decoder;
pub mod evtx_filter;
pub mod metrics;
pub mod payload;

mod event_record;
mod file_processor;
mod run;
mod utils;
