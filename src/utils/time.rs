use crate::err::ConfigError;

use jiff::Timestamp;
use jiff::fmt::strtime;
use jiff::tz::TimeZone;

/// Default display pattern for the `TimeCreated` column.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "yyyy-MM-dd HH:mm:ss.fffffff";

/// A display pattern for timestamps.
///
/// Accepts custom patterns in the `yyyy-MM-dd HH:mm:ss.fffffff` style; anything containing a `%`
/// is taken to be a strftime pattern already. Timestamps are always rendered in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFormat {
    pattern: String,
    strftime: String,
}

impl Default for TimestampFormat {
    fn default() -> Self {
        TimestampFormat {
            pattern: DEFAULT_TIMESTAMP_FORMAT.to_owned(),
            strftime: translate(DEFAULT_TIMESTAMP_FORMAT),
        }
    }
}

impl TimestampFormat {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let strftime = if pattern.contains('%') {
            pattern.to_owned()
        } else {
            translate(pattern)
        };

        let format = TimestampFormat {
            pattern: pattern.to_owned(),
            strftime,
        };

        // Surface bad directives now rather than on the first record.
        format
            .format(Timestamp::UNIX_EPOCH)
            .map_err(|e| ConfigError::TimestampFormat {
                pattern: pattern.to_owned(),
                message: e.to_string(),
            })?;

        Ok(format)
    }

    #[cfg(test)]
    pub(crate) fn unchecked(strftime: &str) -> Self {
        TimestampFormat {
            pattern: strftime.to_owned(),
            strftime: strftime.to_owned(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn strftime(&self) -> &str {
        &self.strftime
    }

    pub fn format(&self, timestamp: Timestamp) -> Result<String, jiff::Error> {
        let zoned = timestamp.to_zoned(TimeZone::UTC);
        strtime::format(&self.strftime, &zoned)
    }
}

/// Translates a custom date/time pattern into its strftime equivalent.
fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        match c {
            '\'' | '"' => {
                let quote = c;
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    push_literal(&mut out, chars[i]);
                    i += 1;
                }
                // Skip the closing quote.
                i += 1;
                continue;
            }
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    push_literal(&mut out, next);
                }
                i += 2;
                continue;
            }
            _ => {}
        }

        let run = chars[i..].iter().take_while(|&&ch| ch == c).count();

        let directive = match (c, run) {
            ('y', 1 | 2) => Some("%y".to_owned()),
            ('y', _) => Some("%Y".to_owned()),
            ('M', 1) => Some("%-m".to_owned()),
            ('M', 2) => Some("%m".to_owned()),
            ('M', 3) => Some("%b".to_owned()),
            ('M', _) => Some("%B".to_owned()),
            ('d', 1) => Some("%-d".to_owned()),
            ('d', 2) => Some("%d".to_owned()),
            ('d', 3) => Some("%a".to_owned()),
            ('d', _) => Some("%A".to_owned()),
            ('H', 1) => Some("%-H".to_owned()),
            ('H', _) => Some("%H".to_owned()),
            ('h', 1) => Some("%-I".to_owned()),
            ('h', _) => Some("%I".to_owned()),
            ('m', 1) => Some("%-M".to_owned()),
            ('m', _) => Some("%M".to_owned()),
            ('s', 1) => Some("%-S".to_owned()),
            ('s', _) => Some("%S".to_owned()),
            ('f' | 'F', n) => Some(format!("%{}f", n.min(9))),
            ('t', _) => Some("%p".to_owned()),
            ('z', 1 | 2) => Some("%z".to_owned()),
            ('z', _) | ('K', _) => Some("%:z".to_owned()),
            _ => None,
        };

        match directive {
            Some(directive) => out.push_str(&directive),
            None => {
                for _ in 0..run {
                    push_literal(&mut out, c);
                }
            }
        }

        i += run;
    }

    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
