use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Returns `None` when `end` is before `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Whole calendar days from `first` up to and including `last`.
    /// Returns `None` when `first` is after `last` or `last` is the final
    /// representable day.
    pub fn days(first: NaiveDate, last: NaiveDate) -> Option<Self> {
        Self::new(midnight(first), midnight(last.succ_opt()?))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn today(now: DateTime<Utc>) -> Self {
        ReportPeriod::Daily.bucket(now)
    }

    /// The last `n` calendar days, today included. `None` if that reaches
    /// outside the supported calendar.
    pub fn last_days(now: DateTime<Utc>, n: u32) -> Option<Self> {
        let today = now.date_naive();
        let first = today.checked_sub_days(Days::new(u64::from(n.max(1) - 1)))?;
        Self::days(first, today)
    }

    pub fn this_week(now: DateTime<Utc>) -> Self {
        ReportPeriod::Weekly.bucket(now)
    }

    pub fn this_month(now: DateTime<Utc>) -> Self {
        ReportPeriod::Monthly.bucket(now)
    }

    pub fn this_year(now: DateTime<Utc>) -> Self {
        ReportPeriod::Yearly.bucket(now)
    }

    /// Named range relative to `now`: `today`, `week`, `month`, `year` or
    /// `last-N` for the last N days.
    pub fn preset(name: &str, now: DateTime<Utc>) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "today" => Some(Self::today(now)),
            "week" => Some(Self::this_week(now)),
            "month" => Some(Self::this_month(now)),
            "year" => Some(Self::this_year(now)),
            other => {
                let n = other.strip_prefix("last-")?.parse().ok()?;
                Self::last_days(now, n)
            }
        }
    }
}

/// Bucket size for movement reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Daily => "daily",
            ReportPeriod::Weekly => "weekly",
            ReportPeriod::Monthly => "monthly",
            ReportPeriod::Yearly => "yearly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Some(ReportPeriod::Daily),
            "weekly" => Some(ReportPeriod::Weekly),
            "monthly" => Some(ReportPeriod::Monthly),
            "yearly" => Some(ReportPeriod::Yearly),
            _ => None,
        }
    }

    /// Start of the bucket containing `ts`. Weeks start on Monday.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        let first = match self {
            ReportPeriod::Daily => date,
            // The first week of the calendar is cut short
            ReportPeriod::Weekly => date
                .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
                .unwrap_or(NaiveDate::MIN),
            ReportPeriod::Monthly => date.with_day0(0).unwrap_or(date),
            ReportPeriod::Yearly => date.with_ordinal0(0).unwrap_or(date),
        };
        midnight(first)
    }

    /// Start of the bucket following the one that starts at `start`, or
    /// `None` past the end of the calendar.
    pub fn next_start(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = start.date_naive();
        let next = match self {
            ReportPeriod::Daily => date.checked_add_days(Days::new(1)),
            ReportPeriod::Weekly => date.checked_add_days(Days::new(7)),
            ReportPeriod::Monthly => date.checked_add_months(Months::new(1)),
            ReportPeriod::Yearly => date.checked_add_months(Months::new(12)),
        };
        next.map(midnight)
    }

    /// The whole bucket containing `ts`. The last bucket of the calendar
    /// runs to the latest representable instant.
    pub fn bucket(&self, ts: DateTime<Utc>) -> DateRange {
        let start = self.bucket_start(ts);
        DateRange {
            start,
            end: self.next_start(start).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Split `range` into consecutive buckets, clipping the first and last
    /// to the range bounds.
    pub fn split(&self, range: DateRange) -> Vec<DateRange> {
        let mut buckets = Vec::new();
        let mut cursor = self.bucket_start(range.start);
        while cursor < range.end {
            let next = self
                .next_start(cursor)
                .map_or(range.end, |next| next.min(range.end));
            buckets.push(DateRange {
                start: cursor.max(range.start),
                end: next,
            });
            cursor = next;
        }
        buckets
    }
}

impl std::fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Current time, truncated to the microsecond precision timestamps are stored at.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_range_is_half_open() {
        let range = DateRange::new(at(2024, 1, 1, 0), at(2024, 1, 2, 0)).unwrap();
        assert!(range.contains(at(2024, 1, 1, 0)));
        assert!(range.contains(at(2024, 1, 1, 23)));
        assert!(!range.contains(at(2024, 1, 2, 0)));
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!(DateRange::new(at(2024, 1, 2, 0), at(2024, 1, 1, 0)).is_none());
        assert!(DateRange::new(at(2024, 1, 1, 0), at(2024, 1, 1, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_days_includes_last_day() {
        let range = DateRange::days(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        assert!(range.contains(at(2024, 1, 31, 18)));
        assert!(!range.contains(at(2024, 2, 1, 0)));
    }

    #[test]
    fn test_presets() {
        // Wednesday
        let now = at(2024, 5, 15, 13);

        assert_eq!(DateRange::today(now).start, at(2024, 5, 15, 0));
        assert_eq!(DateRange::this_week(now).start, at(2024, 5, 13, 0));
        assert_eq!(DateRange::this_week(now).end, at(2024, 5, 20, 0));
        assert_eq!(DateRange::this_month(now).end, at(2024, 6, 1, 0));
        assert_eq!(DateRange::this_year(now).start, at(2024, 1, 1, 0));

        let last_week = DateRange::last_days(now, 7).unwrap();
        assert_eq!(last_week.start, at(2024, 5, 9, 0));
        assert_eq!(last_week.end, at(2024, 5, 16, 0));
        assert_eq!(DateRange::last_days(now, 0), DateRange::last_days(now, 1));
    }

    #[test]
    fn test_named_presets() {
        let now = at(2024, 5, 15, 13);

        assert_eq!(DateRange::preset("today", now), Some(DateRange::today(now)));
        assert_eq!(DateRange::preset(" Week ", now), Some(DateRange::this_week(now)));
        assert_eq!(DateRange::preset("month", now), Some(DateRange::this_month(now)));
        assert_eq!(DateRange::preset("YEAR", now), Some(DateRange::this_year(now)));
        assert_eq!(DateRange::preset("last-7", now), DateRange::last_days(now, 7));

        assert_eq!(DateRange::preset("fortnight", now), None);
        assert_eq!(DateRange::preset("last-", now), None);
        assert_eq!(DateRange::preset("last--3", now), None);
    }

    #[test]
    fn test_calendar_edges_do_not_overflow() {
        let last_day = NaiveDate::MAX;
        assert!(DateRange::days(last_day.pred_opt().unwrap(), last_day).is_none());
        let range = DateRange::days(last_day.pred_opt().unwrap(), last_day.pred_opt().unwrap());
        assert_eq!(range.map(|r| r.end), Some(midnight(last_day)));

        assert!(DateRange::last_days(Utc::now(), u32::MAX).is_none());

        let late = midnight(last_day);
        assert_eq!(ReportPeriod::Yearly.next_start(late), None);
        assert_eq!(ReportPeriod::Monthly.bucket(late).end, DateTime::<Utc>::MAX_UTC);

        let tail = DateRange::new(midnight(last_day.with_day0(0).unwrap()), late).unwrap();
        let buckets = ReportPeriod::Monthly.split(tail);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].end, late);

        let first_day = midnight(NaiveDate::MIN);
        assert_eq!(ReportPeriod::Weekly.bucket_start(first_day), first_day);
    }

    #[test]
    fn test_monthly_bucket_crosses_year() {
        let bucket = ReportPeriod::Monthly.bucket(at(2023, 12, 31, 22));
        assert_eq!(bucket.start, at(2023, 12, 1, 0));
        assert_eq!(bucket.end, at(2024, 1, 1, 0));
    }

    #[test]
    fn test_split_clips_edges() {
        let range = DateRange::new(at(2024, 1, 15, 0), at(2024, 3, 10, 0)).unwrap();
        let buckets = ReportPeriod::Monthly.split(range);

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].start, at(2024, 1, 15, 0));
        assert_eq!(buckets[0].end, at(2024, 2, 1, 0));
        assert_eq!(buckets[1].start, at(2024, 2, 1, 0));
        assert_eq!(buckets[2].end, at(2024, 3, 10, 0));
    }

    #[test]
    fn test_split_empty_range() {
        let range = DateRange::new(at(2024, 1, 15, 0), at(2024, 1, 15, 0)).unwrap();
        assert!(ReportPeriod::Daily.split(range).is_empty());
    }

    #[test]
    fn test_period_roundtrip() {
        for period in [
            ReportPeriod::Daily,
            ReportPeriod::Weekly,
            ReportPeriod::Monthly,
            ReportPeriod::Yearly,
        ] {
            assert_eq!(ReportPeriod::from_str(period.as_str()), Some(period));
        }
    }
}
