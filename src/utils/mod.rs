mod time;

pub use self::time::{DEFAULT_TIMESTAMP_FORMAT, TimestampFormat};
