//! Duration parsing utilities.
//!
//! Command-line flags take durations as bare seconds (`5`) or with a unit
//! suffix (`500ms`, `5s`, `2m`, `1h`).

use std::time::Duration;

/// Parse a duration string to a [`Duration`]
///
/// Supports:
/// - Raw seconds: "5"
/// - Milliseconds: "500ms"
/// - Seconds: "5s", "5sec", "5secs"
/// - Minutes: "2m", "2min", "2mins"
/// - Hours: "1h", "1hr", "1hrs"
///
/// # Examples
/// ```
/// use edgesim::utils::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5"), Ok(Duration::from_secs(5)));
/// assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(duration: &str) -> Result<Duration, String> {
    let duration = duration.trim();
    let split = duration
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(duration.len());
    let (number, unit) = duration.split_at(split);

    let value: u64 = number
        .parse()
        .map_err(|_| format!("Invalid duration format: {}", duration))?;

    match unit {
        "" | "s" | "sec" | "secs" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" | "min" | "mins" => Ok(Duration::from_secs(value * 60)),
        "h" | "hr" | "hrs" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("Invalid duration format: {}", duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("5"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("5secs"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("300ms"), Ok(Duration::from_millis(300)));
        assert_eq!(parse_duration("2min"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration(" 7 "), Ok(Duration::from_secs(7)));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("-5").is_err());
    }
}
