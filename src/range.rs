//! Calendar-date → record-id range arithmetic.
//!
//! The gate keeps no timestamp index: record ids are assigned on a fixed
//! sampling cadence (`interval_ms` apart), so "records for June 15th" can
//! only be approximated by counting intervals backwards from the newest
//! record.  The mapping trades exactness for never scanning full history;
//! it holds exactly as long as the cadence held, and degrades gracefully
//! when it did not.
//!
//! All id arithmetic is exact `u64` — ids take part in equality and
//! ordering comparisons downstream, so floating point is never used here.

use chrono::{Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RangeError {
    /// `interval_ms` is zero or unset; the date→id mapping is undefined.
    /// Callers should disable date-based browsing, nothing else breaks.
    #[error("sampling cadence unknown (interval_ms is zero)")]
    CadenceUnknown,
    /// The timezone cannot represent midnight or end-of-day for this date
    /// (DST gap).
    #[error("day bounds for {0} are not representable in the target timezone")]
    DayBounds(NaiveDate),
}

/// Retention metadata served by the gate's metadata endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateMeta {
    /// Newest retained record id.
    pub head_id: u64,
    /// Oldest retained record id; 0 when unknown.
    #[serde(default)]
    pub oldest_id: u64,
    /// Nominal spacing between consecutive ids; 0 when unknown.
    #[serde(default)]
    pub interval_ms: u64,
}

/// Half-open record-id interval `[since_id, until_id)` covering one
/// calendar day.  `since_id == until_id` is the explicit empty sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayRange {
    pub since_id: u64,
    pub until_id: u64,
}

impl DayRange {
    pub fn empty_at(head_id: u64) -> Self {
        Self { since_id: head_id, until_id: head_id }
    }

    pub fn is_empty(&self) -> bool {
        self.since_id >= self.until_id
    }

    pub fn len(&self) -> u64 {
        self.until_id.saturating_sub(self.since_id)
    }
}

/// Millisecond timestamps of 00:00:00.000 and 23:59:59.999 for `date` in
/// `tz`.  `None` when either wall-clock time does not exist in that zone.
pub fn local_day_bounds<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Option<(i64, i64)> {
    let start = tz.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).earliest()?;
    let end = tz
        .from_local_datetime(&date.and_hms_milli_opt(23, 59, 59, 999)?)
        .latest()?;
    Some((start.timestamp_millis(), end.timestamp_millis()))
}

/// Compute the record-id window approximately covering `date`.
///
/// See the module docs for the cadence model.  Clamping rules:
/// - a day entirely in the future returns the empty sentinel at `head_id`;
/// - a day that includes "now" is capped at `head_id`;
/// - `since_id` below the oldest retained id is clamped up to it (a partial
///   day, logged at `info` — the gate simply no longer has the morning);
/// - both bounds saturate at zero, and a collapsed interval is widened to
///   the minimal valid `[since, since + 1)`.
pub fn resolve_day_range<Tz: TimeZone>(
    date: NaiveDate,
    tz: &Tz,
    meta: &GateMeta,
    now_ms: i64,
) -> Result<DayRange, RangeError> {
    if meta.interval_ms == 0 {
        return Err(RangeError::CadenceUnknown);
    }
    let (day_start, day_end) =
        local_day_bounds(date, tz).ok_or(RangeError::DayBounds(date))?;

    if day_start > now_ms {
        return Ok(DayRange::empty_at(meta.head_id));
    }

    // Whole intervals elapsed between a past instant and now.
    let steps_back = |from_ms: i64| ((now_ms - from_ms).max(0) as u64) / meta.interval_ms;

    let mut until_id = if day_end >= now_ms {
        meta.head_id
    } else {
        meta.head_id.saturating_sub(steps_back(day_end))
    };
    let mut since_id = meta.head_id.saturating_sub(steps_back(day_start));

    if meta.oldest_id > 0 && since_id < meta.oldest_id {
        log::info!(
            "partial day {date}: since_id {since_id} clamped to oldest retained id {}",
            meta.oldest_id
        );
        since_id = meta.oldest_id;
    }

    if until_id <= since_id {
        until_id = since_id.saturating_add(1);
    }
    if since_id >= until_id {
        // Only reachable when since_id saturated at u64::MAX.
        return Ok(DayRange::empty_at(meta.head_id));
    }

    Ok(DayRange { since_id, until_id })
}

/// [`resolve_day_range`] against the system's local timezone and clock.
pub fn resolve_day_range_local(date: NaiveDate, meta: &GateMeta) -> Result<DayRange, RangeError> {
    resolve_day_range(date, &Local, meta, Local::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn ms(tz: &FixedOffset, y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        tz.with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn today_at_noon_counts_back_from_head() {
        let tz = utc();
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let now = ms(&tz, 2024, 6, 15, 12, 0, 0);
        let meta = GateMeta { head_id: 100_000, oldest_id: 0, interval_ms: 30_000 };

        let r = resolve_day_range(date, &tz, &meta, now).unwrap();
        // Noon is 43200 s past midnight; one id every 30 s.
        assert_eq!(r.until_id, 100_000);
        assert_eq!(r.since_id, 100_000 - 43_200 / 30);
    }

    #[test]
    fn future_date_is_empty_sentinel() {
        let tz = utc();
        let date = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
        let now = ms(&tz, 2024, 6, 15, 12, 0, 0);
        let meta = GateMeta { head_id: 1000, oldest_id: 0, interval_ms: 30_000 };

        let r = resolve_day_range(date, &tz, &meta, now).unwrap();
        assert_eq!(r, DayRange::empty_at(1000));
        assert!(r.is_empty());
    }

    #[test]
    fn since_clamped_to_oldest_retained() {
        let tz = utc();
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let now = ms(&tz, 2024, 6, 15, 12, 0, 0);
        let meta = GateMeta { head_id: 100_000, oldest_id: 99_500, interval_ms: 30_000 };

        let r = resolve_day_range(date, &tz, &meta, now).unwrap();
        assert_eq!(r.since_id, 99_500);
        assert_eq!(r.until_id, 100_000);
    }

    #[test]
    fn past_day_caps_until_below_head() {
        let tz = utc();
        let date = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let now = ms(&tz, 2024, 6, 15, 12, 0, 0);
        let meta = GateMeta { head_id: 100_000, oldest_id: 0, interval_ms: 30_000 };

        let r = resolve_day_range(date, &tz, &meta, now).unwrap();
        // day_end = 14th 23:59:59.999, 12h 0.001s before now → 1440 steps.
        assert_eq!(r.until_id, 100_000 - 1440);
        // day_start = 14th 00:00, 36 h before now → 4320 steps.
        assert_eq!(r.since_id, 100_000 - 4320);
    }

    #[test]
    fn collapsed_interval_widened_to_one() {
        let tz = utc();
        // Cadence coarser than a day: start and end of an old day floor to
        // the same id.
        let date = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
        let now = ms(&tz, 2024, 6, 15, 12, 0, 0);
        let week_ms = 7 * 24 * 3600 * 1000;
        let meta = GateMeta { head_id: 500, oldest_id: 0, interval_ms: week_ms };

        let r = resolve_day_range(date, &tz, &meta, now).unwrap();
        assert_eq!(r.until_id, r.since_id + 1);
        assert!(!r.is_empty());
    }

    #[test]
    fn bounds_saturate_at_zero() {
        let tz = utc();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let now = ms(&tz, 2024, 6, 15, 12, 0, 0);
        let meta = GateMeta { head_id: 5, oldest_id: 0, interval_ms: 30_000 };

        let r = resolve_day_range(date, &tz, &meta, now).unwrap();
        assert_eq!(r.since_id, 0);
        assert_eq!(r.until_id, 1);
    }

    #[test]
    fn zero_interval_is_a_config_error() {
        let tz = utc();
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let meta = GateMeta { head_id: 1000, oldest_id: 0, interval_ms: 0 };

        assert!(matches!(
            resolve_day_range(date, &tz, &meta, 0),
            Err(RangeError::CadenceUnknown)
        ));
    }

    #[test]
    fn meta_deserializes_with_defaults() {
        let m: GateMeta = serde_json::from_str(r#"{"head_id": 42}"#).unwrap();
        assert_eq!(m, GateMeta { head_id: 42, oldest_id: 0, interval_ms: 0 });
    }
}
