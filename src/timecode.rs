//! Timecode parsing and formatting.
//!
//! Accepts `HH:MM:SS`, `MM:SS`, plain seconds, and fractional seconds in any
//! of those positions (`00:01:02.5`, `90.25`).

use std::time::Duration;

use crate::error::VidmeshError;

/// Parse a timecode into a [`Duration`].
///
/// # Errors
///
/// Returns [`VidmeshError::Config`] for empty input, negative values, more
/// than three `:`-separated fields, or minutes/seconds fields of 60 or more
/// in the `HH:MM:SS` / `MM:SS` forms.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// assert_eq!(vidmesh::parse_timecode("00:01:30").unwrap(), Duration::from_secs(90));
/// assert_eq!(vidmesh::parse_timecode("2.5").unwrap(), Duration::from_millis(2500));
/// ```
pub fn parse_timecode(value: &str) -> Result<Duration, VidmeshError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(VidmeshError::Config("time value cannot be empty".into()));
    }

    let invalid = || VidmeshError::Config(format!("invalid time format: {trimmed}"));

    if !trimmed.contains(':') {
        let seconds = trimmed.parse::<f64>().map_err(|_| invalid())?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(invalid());
        }
        return Duration::try_from_secs_f64(seconds).map_err(|_| invalid());
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [hours, minutes, seconds] => (parse_field(hours)?, parse_field(minutes)?, *seconds),
        [minutes, seconds] => (0, parse_field(minutes)?, *seconds),
        _ => return Err(invalid()),
    };

    let seconds = seconds.parse::<f64>().map_err(|_| invalid())?;
    if !seconds.is_finite() || !(0.0..60.0).contains(&seconds) || (parts.len() == 3 && minutes >= 60) {
        return Err(invalid());
    }

    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Duration::try_from_secs_f64(total_seconds).map_err(|_| invalid())
}

fn parse_field(field: &str) -> Result<u64, VidmeshError> {
    field
        .parse::<u64>()
        .map_err(|_| VidmeshError::Config(format!("invalid time field: {field}")))
}

/// Format a duration as `HH:MM:SS.mmm`.
pub fn format_timecode(duration: Duration) -> String {
    let total_millis = duration.as_millis();
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis / 60_000) % 60;
    let seconds = (total_millis / 1000) % 60;
    let millis = total_millis % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_accepted_forms() {
        assert_eq!(parse_timecode("01:00:00").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_timecode("02:30").unwrap(), Duration::from_secs(150));
        assert_eq!(parse_timecode("42").unwrap(), Duration::from_secs(42));
        assert_eq!(parse_timecode("00:00:10.5").unwrap(), Duration::from_millis(10_500));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
        assert!(parse_timecode("00:61:00").is_err());
        assert!(parse_timecode("-5").is_err());
        assert!(parse_timecode("ab:cd").is_err());
    }

    #[test]
    fn out_of_range_values_are_config_errors() {
        for value in ["1e300", "18446744073709551615:00:00"] {
            assert!(
                matches!(parse_timecode(value), Err(VidmeshError::Config(_))),
                "{value}"
            );
        }
    }

    #[test]
    fn formats_with_millisecond_precision() {
        assert_eq!(format_timecode(Duration::from_millis(3_723_045)), "01:02:03.045");
    }
}
