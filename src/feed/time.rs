//! GTFS clock-time parsing and `HH:MM` formatting.

use crate::error::PipelineError;
use crate::model::Seconds;

/// Parses a GTFS `H:MM:SS` time into seconds since midnight.
///
/// Blank values are untimed points and yield `None`. Hours may exceed 23 for
/// trips running past midnight.
///
/// # Errors
///
/// Returns [`PipelineError::MalformedTime`] for anything that is not three
/// colon-separated numbers with minutes and seconds below 60.
pub fn parse_gtfs_time(
    value: &str,
    agency: &str,
    trip_id: &str,
) -> Result<Option<Seconds>, PipelineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let malformed = || PipelineError::MalformedTime {
        value: value.to_string(),
        agency: agency.to_string(),
        trip_id: trip_id.to_string(),
    };

    let mut parts = trimmed.split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    let field = |part: &str| -> Option<u32> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        part.parse().ok()
    };

    match (field(h), field(m), field(s)) {
        (Some(h), Some(m), Some(s)) if m < 60 && s < 60 => h
            .checked_mul(3600)
            .and_then(|seconds| seconds.checked_add(m * 60 + s))
            .map(Some)
            .ok_or_else(malformed),
        _ => Err(malformed()),
    }
}

/// Formats seconds since midnight as zero-padded `HH:MM`, keeping hours past 23.
pub fn format_hhmm(seconds: Seconds) -> String {
    format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

/// The `HH:00` bucket a time falls into.
pub fn hour_bucket(seconds: Seconds) -> String {
    format!("{:02}:00", seconds / 3600)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regular_and_late_times() {
        assert_eq!(parse_gtfs_time("08:05:30", "GO", "t").unwrap(), Some(29130));
        assert_eq!(parse_gtfs_time("8:05:00", "GO", "t").unwrap(), Some(29100));
        assert_eq!(parse_gtfs_time(" 25:13:00", "GO", "t").unwrap(), Some(90780));
    }

    #[test]
    fn test_parse_rejects_hours_past_seconds_range() {
        let err = parse_gtfs_time("9999999:00:00", "GO", "t").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedTime { .. }));
        // Large but representable hours still parse.
        assert_eq!(parse_gtfs_time("1000:00:00", "GO", "t").unwrap(), Some(3_600_000));
    }

    #[test]
    fn test_parse_blank_is_untimed() {
        assert_eq!(parse_gtfs_time("", "GO", "t").unwrap(), None);
        assert_eq!(parse_gtfs_time("   ", "GO", "t").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        for value in ["8am", "08:00", "08:61:00", "08:00:00:00", "-1:00:00", "aa:bb:cc"] {
            let err = parse_gtfs_time(value, "YRT", "trip-9").unwrap_err();
            assert_eq!(
                err,
                PipelineError::MalformedTime {
                    value: value.to_string(),
                    agency: "YRT".to_string(),
                    trip_id: "trip-9".to_string(),
                }
            );
        }
    }

    #[test]
    fn test_format_hhmm() {
        assert_eq!(format_hhmm(0), "00:00");
        assert_eq!(format_hhmm(29130), "08:05");
        assert_eq!(format_hhmm(90780), "25:13");
    }

    #[test]
    fn test_hour_bucket() {
        assert_eq!(hour_bucket(29130), "08:00");
        assert_eq!(hour_bucket(90780), "25:00");
    }
}
