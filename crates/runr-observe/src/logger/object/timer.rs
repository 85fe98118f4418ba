use std::{fmt, time::SystemTime};

use time::{OffsetDateTime, UtcOffset};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

/// Format `at` in UTC as `YYYY-MM-DDThh:mm:ss.ffffffZ`.
///
/// The width is fixed for years 0000-9999.
///
/// ```
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let at = UNIX_EPOCH + Duration::from_micros(1_500_000);
/// assert_eq!(runr_observe::format_utc_micros(at), "1970-01-01T00:00:01.500000Z");
/// ```
pub fn format_utc_micros(at: SystemTime) -> String {
    let at = OffsetDateTime::from(at).to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}Z",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        at.microsecond(),
    )
}

/// Record timer printing [`format_utc_micros`] timestamps.
#[derive(Debug, Clone, Copy)]
pub struct LoggerUtcMicros;

impl FormatTime for LoggerUtcMicros {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", format_utc_micros(SystemTime::now()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn pads_fraction_to_six_digits() {
        let at = UNIX_EPOCH + Duration::from_secs(1_609_462_800) + Duration::from_micros(42);
        assert_eq!(format_utc_micros(at), "2021-01-01T01:00:00.000042Z");
    }

    #[test]
    fn width_is_constant() {
        let a = format_utc_micros(UNIX_EPOCH);
        let b = format_utc_micros(UNIX_EPOCH + Duration::from_nanos(999_999_999));
        assert_eq!(a, "1970-01-01T00:00:00.000000Z");
        assert_eq!(a.len(), b.len());
    }
}
