use crate::err::ConfigError;
use crate::event_record::EventRecord;

use hashbrown::HashSet;
use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::Offset;
use log::{debug, warn};

/// Textual pattern accepted for the `from`/`to` boundaries.
pub const BOUNDARY_FORMAT: &str = "yyyy/MM/dd HH:mm";

/// Selection policy applied to every decoded record.
///
/// When `include_ids` is non-empty, `exclude_ids` is never consulted.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    include_ids: HashSet<u32>,
    exclude_ids: HashSet<u32>,
    from: Option<Timestamp>,
    to: Option<Timestamp>,
}

impl FilterConfig {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        include_ids: HashSet<u32>,
        exclude_ids: HashSet<u32>,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<Self, ConfigError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ConfigError::InvertedTimeRange { from, to });
            }
        }

        if !include_ids.is_empty() && !exclude_ids.is_empty() {
            warn!("Both include and exclude ids were given, exclude ids will be ignored");
        }

        Ok(FilterConfig {
            include_ids,
            exclude_ids,
            from,
            to,
        })
    }

    pub fn include_ids(&self) -> &HashSet<u32> {
        &self.include_ids
    }

    pub fn exclude_ids(&self) -> &HashSet<u32> {
        &self.exclude_ids
    }

    pub fn from(&self) -> Option<Timestamp> {
        self.from
    }

    pub fn to(&self) -> Option<Timestamp> {
        self.to
    }

    /// Event id part of the policy alone.
    pub fn accepts_event_id(&self, event_id: u32) -> bool {
        if !self.include_ids.is_empty() {
            return self.include_ids.contains(&event_id);
        }

        !self.exclude_ids.contains(&event_id)
    }

    /// Time window part of the policy alone. Both bounds are inclusive.
    pub fn accepts_time(&self, t: Timestamp) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from <= t && t <= to,
            (Some(from), None) => t >= from,
            (None, Some(to)) => t <= to,
            (None, None) => true,
        }
    }

    pub fn accepts(&self, record: &EventRecord) -> bool {
        if !self.accepts_event_id(record.event_id) {
            debug!(
                "Record {} rejected by event id {}",
                record.record_number(),
                record.event_id
            );
            return false;
        }

        if !self.accepts_time(record.time_created) {
            debug!(
                "Record {} rejected by time window ({})",
                record.record_number(),
                record.time_created
            );
            return false;
        }

        true
    }
}

/// Parses a comma separated list of event ids, e.g. `4624,4625,5410`.
///
/// Segments which are not integers are skipped.
pub fn parse_id_list(value: &str) -> HashSet<u32> {
    let mut ids = HashSet::new();

    for segment in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match segment.parse::<u32>() {
            Ok(id) => {
                ids.insert(id);
            }
            Err(_) => warn!("Ignoring invalid event id `{}`", segment),
        }
    }

    ids
}

/// Parses a `yyyy/MM/dd HH:mm` boundary, interpreted as UTC.
pub fn parse_boundary(value: &str) -> Result<Timestamp, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidBoundary {
        value: value.to_owned(),
        message,
    };

    // Seconds are pinned to zero, the boundary has minute resolution.
    let with_seconds = format!("{}:00", value.trim());
    let dt = DateTime::strptime("%Y/%m/%d %H:%M:%S", with_seconds)
        .map_err(|e| invalid(e.to_string()))?;

    Offset::UTC
        .to_timestamp(dt)
        .map_err(|e| invalid(e.to_string()))
}
