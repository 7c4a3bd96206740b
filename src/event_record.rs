use jiff::Timestamp;
use std::path::PathBuf;

/// A single decoded event, as handed out by an [`EventLog`](crate::decoder::EventLog).
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    record_number: u64,
    pub event_id: u32,
    pub time_created: Timestamp,
    pub provider: String,
    pub channel: String,
    pub computer: String,
    /// XML text until normalized, the flattened `key: value` form afterwards.
    pub payload: String,
    /// Set by the file processor before filtering.
    pub source_file: PathBuf,
}

impl EventRecord {
    pub fn new(
        record_number: u64,
        event_id: u32,
        time_created: Timestamp,
        payload: impl Into<String>,
    ) -> Self {
        EventRecord {
            record_number,
            event_id,
            time_created,
            provider: String::new(),
            channel: String::new(),
            computer: String::new(),
            payload: payload.into(),
            source_file: PathBuf::new(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_computer(mut self, computer: impl Into<String>) -> Self {
        self.computer = computer.into();
        self
    }

    pub fn record_number(&self) -> u64 {
        self.record_number
    }
}
