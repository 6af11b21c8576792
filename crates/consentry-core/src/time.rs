use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// TimeError
// ---------------------------------------------------------------------------

/// Temporal failures. A timestamp that cannot be parsed is always an error,
/// never a silent pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("unrecognizable timestamp: {0:?}")]
    Parse(String),

    #[error("period start {start} is after end {end}")]
    InvertedPeriod { start: String, end: String },
}

// ---------------------------------------------------------------------------
// Instant parsing — documented ISO-8601 forms, normalized to UTC
// ---------------------------------------------------------------------------

/// Parse a timestamp into a UTC instant.
///
/// Accepted forms:
/// - RFC 3339 with `Z` or an explicit offset (`2025-03-01T12:00:00+03:00`),
///   always normalized to UTC
/// - with `strict = false` additionally: an unsuffixed date-time
///   (`2025-03-01T12:00:00`, documented as UTC) and a bare date
///   (`2025-03-01`, midnight UTC)
pub fn parse_instant(s: &str, strict: bool) -> Result<DateTime<Utc>, TimeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if !strict {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
            return Ok(naive.and_utc());
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(naive.and_utc());
            }
        }
    }
    Err(TimeError::Parse(s.to_string()))
}

/// Render an instant in the canonical wire form: RFC 3339, whole seconds,
/// `Z` suffix. Stable output keeps serialized snapshots byte-comparable.
pub fn format_instant(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Period — closed UTC interval with start ≤ end
// ---------------------------------------------------------------------------

/// A closed UTC interval. The `start ≤ end` invariant is enforced at
/// construction and on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct Period {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawPeriod> for Period {
    type Error = TimeError;

    fn try_from(raw: RawPeriod) -> Result<Self, Self::Error> {
        Period::new(raw.start, raw.end)
    }
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeError> {
        if start > end {
            return Err(TimeError::InvertedPeriod {
                start: format_instant(start),
                end: format_instant(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse both endpoints and construct the period.
    pub fn parse(start: &str, end: &str, strict: bool) -> Result<Self, TimeError> {
        Self::new(parse_instant(start, strict)?, parse_instant(end, strict)?)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether the instant lies within the closed interval.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// Whether `other` lies entirely within this period.
    pub fn encloses(&self, other: &Period) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether the two periods share at least one instant.
    pub fn overlaps(&self, other: &Period) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Fraction of `other` covered by this period, in [0, 1]. Linear: a
    /// window half inside the period scores 0.5. A zero-length `other`
    /// scores 1.0 when contained, 0.0 otherwise.
    pub fn overlap_fraction(&self, other: &Period) -> f64 {
        let other_secs = (other.end - other.start).num_seconds();
        if other_secs <= 0 {
            return if self.contains(other.start) { 1.0 } else { 0.0 };
        }
        let overlap_start = self.start.max(other.start);
        let overlap_end = self.end.min(other.end);
        let overlap_secs = (overlap_end - overlap_start).num_seconds();
        if overlap_secs <= 0 {
            return 0.0;
        }
        (overlap_secs as f64 / other_secs as f64).clamp(0.0, 1.0)
    }

    /// Interval length in seconds; used by the matcher's narrower-period
    /// tie-break.
    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", format_instant(self.start), format_instant(self.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_instant(s, true).unwrap()
    }

    #[test]
    fn test_parse_rfc3339_z() {
        let t = parse_instant("2025-03-01T12:00:00Z", true).unwrap();
        assert_eq!(format_instant(t), "2025-03-01T12:00:00Z");
    }

    #[test]
    fn test_parse_explicit_offset_normalizes_to_utc() {
        let t = parse_instant("2025-03-01T15:00:00+03:00", true).unwrap();
        assert_eq!(format_instant(t), "2025-03-01T12:00:00Z");
    }

    #[test]
    fn test_parse_fractional_seconds() {
        let t = parse_instant("2025-03-01T12:00:00.250Z", true).unwrap();
        assert_eq!(format_instant(t), "2025-03-01T12:00:00Z");
    }

    #[test]
    fn test_strict_rejects_unsuffixed() {
        assert!(parse_instant("2025-03-01T12:00:00", true).is_err());
        assert!(parse_instant("2025-03-01", true).is_err());
    }

    #[test]
    fn test_lenient_accepts_unsuffixed_as_utc() {
        let t = parse_instant("2025-03-01T12:00:00", false).unwrap();
        assert_eq!(format_instant(t), "2025-03-01T12:00:00Z");
        let d = parse_instant("2025-03-01", false).unwrap();
        assert_eq!(format_instant(d), "2025-03-01T00:00:00Z");
    }

    #[test]
    fn test_garbage_is_an_error_in_both_modes() {
        for strict in [true, false] {
            assert!(matches!(
                parse_instant("not-a-time", strict),
                Err(TimeError::Parse(_))
            ));
            assert!(parse_instant("", strict).is_err());
            assert!(parse_instant("2025-13-40T99:00:00Z", strict).is_err());
        }
    }

    #[test]
    fn test_period_invariant() {
        assert!(Period::parse("2025-01-01T00:00:00Z", "2025-12-31T00:00:00Z", true).is_ok());
        let err = Period::parse("2025-12-31T00:00:00Z", "2025-01-01T00:00:00Z", true).unwrap_err();
        assert!(matches!(err, TimeError::InvertedPeriod { .. }));
    }

    #[test]
    fn test_period_deserialize_rejects_inverted() {
        let ok: Result<Period, _> = serde_json::from_str(
            r#"{"start":"2025-01-01T00:00:00Z","end":"2025-06-30T00:00:00Z"}"#,
        );
        assert!(ok.is_ok());
        let bad: Result<Period, _> = serde_json::from_str(
            r#"{"start":"2025-06-30T00:00:00Z","end":"2025-01-01T00:00:00Z"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_contains_closed_endpoints() {
        let p = Period::parse("2025-01-01T00:00:00Z", "2025-12-31T00:00:00Z", true).unwrap();
        assert!(p.contains(ts("2025-01-01T00:00:00Z")));
        assert!(p.contains(ts("2025-12-31T00:00:00Z")));
        assert!(p.contains(ts("2025-06-15T08:30:00Z")));
        assert!(!p.contains(ts("2024-12-31T23:59:59Z")));
        assert!(!p.contains(ts("2025-12-31T00:00:01Z")));
    }

    #[test]
    fn test_encloses() {
        let outer = Period::parse("2025-01-01T00:00:00Z", "2025-12-31T00:00:00Z", true).unwrap();
        let inner = Period::parse("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z", true).unwrap();
        assert!(outer.encloses(&inner));
        assert!(!inner.encloses(&outer));
        assert!(outer.encloses(&outer));
    }

    #[test]
    fn test_overlap_fraction_partial() {
        // Consent through June 30; request June 29 to July 5: one of six
        // days falls inside.
        let consent = Period::parse("2025-01-01T00:00:00Z", "2025-06-30T00:00:00Z", true).unwrap();
        let request = Period::parse("2025-06-29T00:00:00Z", "2025-07-05T00:00:00Z", true).unwrap();
        let frac = consent.overlap_fraction(&request);
        assert!(frac > 0.0 && frac < 1.0);
        assert!((frac - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_fraction_contained_and_disjoint() {
        let consent = Period::parse("2025-01-01T00:00:00Z", "2025-12-31T00:00:00Z", true).unwrap();
        let inside = Period::parse("2025-03-01T00:00:00Z", "2025-03-02T00:00:00Z", true).unwrap();
        let outside = Period::parse("2026-03-01T00:00:00Z", "2026-03-02T00:00:00Z", true).unwrap();
        assert_eq!(consent.overlap_fraction(&inside), 1.0);
        assert_eq!(consent.overlap_fraction(&outside), 0.0);
    }

    #[test]
    fn test_overlap_fraction_zero_length_window() {
        let consent = Period::parse("2025-01-01T00:00:00Z", "2025-12-31T00:00:00Z", true).unwrap();
        let at = ts("2025-06-15T00:00:00Z");
        let point = Period::new(at, at).unwrap();
        assert_eq!(consent.overlap_fraction(&point), 1.0);
        let outside = ts("2026-06-15T00:00:00Z");
        let point_out = Period::new(outside, outside).unwrap();
        assert_eq!(consent.overlap_fraction(&point_out), 0.0);
    }
}
