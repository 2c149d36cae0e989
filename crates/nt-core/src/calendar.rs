//! Mapping of calendar dates onto the source site's diary days.
//!
//! The site does not start a day at local midnight. A diary day begins two
//! hours after midnight in `Europe/Berlin` and lasts 24 hours, with the end
//! bound inclusive (`start + 86399`).

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Timezone the source site keeps its diary in.
pub const SITE_TIMEZONE: Tz = chrono_tz::Europe::Berlin;

/// Offset of the diary day start relative to local midnight.
pub const DAY_START_OFFSET: Duration = Duration::hours(2);

/// Length of a diary window in seconds, end bound inclusive.
pub const WINDOW_SPAN_SECS: i64 = 24 * 60 * 60 - 1;

/// An epoch-second interval representing one diary day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeframe {
    from: i64,
    to: i64,
}

impl Timeframe {
    /// Creates a timeframe, returning `None` unless `from < to`.
    pub const fn new(from: i64, to: i64) -> Option<Self> {
        if from < to {
            Some(Self { from, to })
        } else {
            None
        }
    }

    pub const fn from(&self) -> i64 {
        self.from
    }

    pub const fn to(&self) -> i64 {
        self.to
    }
}

/// Converts dates into diary windows for a fixed timezone and day offset.
#[derive(Debug, Clone, Copy)]
pub struct DiaryCalendar {
    tz: Tz,
    day_start_offset: Duration,
}

impl Default for DiaryCalendar {
    fn default() -> Self {
        Self::new(SITE_TIMEZONE, DAY_START_OFFSET)
    }
}

impl DiaryCalendar {
    pub const fn new(tz: Tz, day_start_offset: Duration) -> Self {
        Self {
            tz,
            day_start_offset,
        }
    }

    /// Returns the diary window for `date`.
    pub fn window_for(&self, date: NaiveDate) -> Timeframe {
        let start = self.local_midnight(date) + self.day_start_offset;
        let from = start.timestamp();
        Timeframe {
            from,
            to: from + WINDOW_SPAN_SECS,
        }
    }

    /// Returns the calendar date of `now` in the site timezone.
    pub fn date_of(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// Today's date in the site timezone.
    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }

    /// Yesterday's date in the site timezone.
    pub fn yesterday(&self) -> NaiveDate {
        self.today() - Duration::days(1)
    }

    /// Returns the diary window for yesterday, derived from the current instant.
    pub fn window_for_yesterday(&self) -> Timeframe {
        self.window_for(self.yesterday())
    }

    /// Resolves local midnight of `date` to UTC.
    /// Ambiguous times pick the earlier instant; a midnight inside a DST gap
    /// moves forward to the first hour that exists.
    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let mut local = date.and_time(NaiveTime::MIN);
        loop {
            match self.tz.from_local_datetime(&local) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    return dt.with_timezone(&Utc);
                }
                LocalResult::None => local += Duration::hours(1),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn summer_window_starts_at_two_local() {
        // 2024-08-27 00:00 CEST is 2024-08-26T22:00:00Z; +2h => 2024-08-27T00:00:00Z.
        let window = DiaryCalendar::default().window_for(date(2024, 8, 27));
        assert_eq!(window.from(), 1_724_716_800);
        assert_eq!(window.to(), 1_724_716_800 + 86_399);
    }

    #[test]
    fn winter_window_starts_at_two_local() {
        // 2024-01-10 00:00 CET is 2024-01-09T23:00:00Z; +2h => 2024-01-10T01:00:00Z.
        let window = DiaryCalendar::default().window_for(date(2024, 1, 10));
        assert_eq!(window.from(), 1_704_848_400);
    }

    #[test]
    fn window_span_is_constant_across_dst_changes() {
        let calendar = DiaryCalendar::default();
        for day in [
            date(2024, 3, 30),
            date(2024, 3, 31),
            date(2024, 10, 27),
            date(2024, 12, 31),
            date(2000, 2, 29),
        ] {
            let window = calendar.window_for(day);
            assert!(window.from() < window.to());
            assert_eq!(window.to() - window.from(), 86_399, "day {day}");
        }
    }

    #[test]
    fn consecutive_windows_do_not_overlap_outside_dst() {
        let calendar = DiaryCalendar::default();
        let first = calendar.window_for(date(2024, 8, 27));
        let second = calendar.window_for(date(2024, 8, 28));
        assert_eq!(second.from(), first.to() + 1);
    }

    #[test]
    fn midnight_in_dst_gap_moves_forward() {
        // Cuba skips 00:00-01:00 when switching to daylight time.
        let calendar = DiaryCalendar::new(chrono_tz::America::Havana, Duration::zero());
        let window = calendar.window_for(date(2024, 3, 10));
        let start = DateTime::from_timestamp(window.from(), 0).unwrap();
        let local = start.with_timezone(&chrono_tz::America::Havana);
        assert_eq!(local.date_naive(), date(2024, 3, 10));
        assert_eq!(local.time(), NaiveTime::from_hms_opt(1, 0, 0).unwrap());
    }

    #[test]
    fn date_of_uses_site_timezone() {
        let calendar = DiaryCalendar::default();
        let late_utc = DateTime::parse_from_rfc3339("2024-08-27T22:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(calendar.date_of(late_utc), date(2024, 8, 28));
    }

    #[test]
    fn yesterday_window_matches_window_for_yesterday() {
        let calendar = DiaryCalendar::default();
        let before = calendar.yesterday();
        let window = calendar.window_for_yesterday();
        let after = calendar.yesterday();

        // The date can roll over between calls; accept either side.
        let expected = [before, after].map(|day| calendar.window_for(day));
        assert!(expected.contains(&window), "{window:?} not in {expected:?}");
    }

    #[test]
    fn timeframe_rejects_empty_interval() {
        assert!(Timeframe::new(10, 10).is_none());
        assert!(Timeframe::new(11, 10).is_none());
        assert_eq!(Timeframe::new(1, 2).map(|t| (t.from(), t.to())), Some((1, 2)));
    }
}
