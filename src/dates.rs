//! Chart cycle date resolution.
//!
//! Charts are published on a fixed ~28 day cadence. A run works against exactly
//! one cycle: the most recent publication date that is at most 20 days in the
//! future and at most 36 days in the past, relative to today.

use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// How far ahead of today a publication date may lie (days).
pub const MAX_DAYS_AHEAD: i64 = 20;

/// How far behind today a publication date may lie (days).
pub const MAX_DAYS_BEHIND: i64 = 36;

/// Formats accepted for candidate dates.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m-%d-%Y", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y"];

/// The resolved chart cycle date, valid for the whole run.
///
/// Displays as `MM-DD-YYYY`, the form used in download URLs, cache keys and
/// date-suffixed workspace names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChartDate(NaiveDate);

impl ChartDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for ChartDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%m-%d-%Y"))
    }
}

/// Parse a candidate publication date in any of the accepted formats.
pub fn parse_chart_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| PipelineError::InvalidDate(raw.to_string()))
}

/// Select the cycle date for `today` from the candidate publication dates.
///
/// Candidates are considered most recent first; the first whose distance
/// `today - candidate` lies in `[-MAX_DAYS_AHEAD, MAX_DAYS_BEHIND]` wins.
pub fn resolve_chart_date(today: NaiveDate, candidates: &[NaiveDate]) -> Result<ChartDate> {
    let mut sorted = candidates.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    sorted
        .into_iter()
        .find(|candidate| {
            let diff = (today - *candidate).num_days();
            (-MAX_DAYS_AHEAD..=MAX_DAYS_BEHIND).contains(&diff)
        })
        .map(ChartDate::new)
        .ok_or(PipelineError::NoValidCycle {
            today,
            candidates: candidates.len(),
        })
}

#[derive(Deserialize)]
struct ChartDatesFile {
    #[serde(rename = "ChartDates")]
    chart_dates: Vec<String>,
}

/// Read candidate dates from a `{ "ChartDates": [...] }` JSON document.
pub fn load_chart_dates_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    let parsed: ChartDatesFile = serde_json::from_str(&contents)?;
    Ok(parsed.chart_dates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(n)
    }

    #[test]
    fn test_picks_unique_valid_candidate() {
        let chosen = resolve_chart_date(day(100), &[day(60), day(80), day(130)]).unwrap();
        assert_eq!(chosen.date(), day(80));
    }

    #[test]
    fn test_prefers_most_recent_when_several_qualify() {
        // Unsorted input; both day(90) and day(115) are inside the window.
        let chosen = resolve_chart_date(day(100), &[day(90), day(115), day(50)]).unwrap();
        assert_eq!(chosen.date(), day(115));
    }

    #[test]
    fn test_window_boundaries_are_inclusive() {
        let ahead = resolve_chart_date(day(100), &[day(120)]).unwrap();
        assert_eq!(ahead.date(), day(120));

        let behind = resolve_chart_date(day(100), &[day(64)]).unwrap();
        assert_eq!(behind.date(), day(64));

        assert!(resolve_chart_date(day(100), &[day(121)]).is_err());
        assert!(resolve_chart_date(day(100), &[day(63)]).is_err());
    }

    #[test]
    fn test_no_candidate_is_fatal() {
        let err = resolve_chart_date(day(100), &[day(10), day(200)]).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, PipelineError::NoValidCycle { candidates: 2, .. }));

        let err = resolve_chart_date(day(100), &[]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_display_is_fixed_width() {
        let date = ChartDate::new(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(date.to_string(), "02-01-2024");
    }

    #[test]
    fn test_parse_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 21).unwrap();
        assert_eq!(parse_chart_date("2024-03-21").unwrap(), expected);
        assert_eq!(parse_chart_date("03-21-2024").unwrap(), expected);
        assert_eq!(parse_chart_date("03/21/2024").unwrap(), expected);
        assert_eq!(parse_chart_date("March 21, 2024").unwrap(), expected);
        assert_eq!(parse_chart_date(" 2024-03-21 ").unwrap(), expected);
        assert!(parse_chart_date("next tuesday").is_err());
    }

    #[test]
    fn test_load_chart_dates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chartdates.json");
        std::fs::write(&path, r#"{ "ChartDates": ["2024-01-25", "2024-02-22"] }"#).unwrap();

        let dates = load_chart_dates_file(&path).unwrap();
        assert_eq!(dates, vec!["2024-01-25", "2024-02-22"]);
    }
}
