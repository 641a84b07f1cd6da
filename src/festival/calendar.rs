use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;

use super::Season;

/// Festival days are observed in China Standard Time, which has no DST.
const CHINA_UTC_OFFSET_HOURS: i64 = 8;

/// Lunar New Year falls on a different Gregorian day every year.
const BUILTIN_SPRING_FESTIVAL: [(i32, u32, u32); 4] = [
    (2024, 2, 10),
    (2025, 1, 29),
    (2026, 2, 17),
    (2027, 2, 6),
];

/// Wall-clock time in UTC+8, without any timezone database.
pub fn china_local(now: DateTime<Utc>) -> NaiveDateTime {
    (now + Duration::hours(CHINA_UTC_OFFSET_HOURS)).naive_utc()
}

pub fn current_year(now: DateTime<Utc>) -> i32 {
    china_local(now).year()
}

#[derive(Debug, Clone)]
pub struct FestivalCalendar {
    spring: BTreeMap<i32, NaiveDate>,
}

impl Default for FestivalCalendar {
    fn default() -> Self {
        let spring = BUILTIN_SPRING_FESTIVAL
            .iter()
            .filter_map(|&(year, month, day)| NaiveDate::from_ymd_opt(year, month, day))
            .map(|date| (date.year(), date))
            .collect();
        Self { spring }
    }
}

impl FestivalCalendar {
    /// Adds or replaces spring festival dates, keyed by their year.
    pub fn with_spring_dates(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        for date in dates {
            self.spring.insert(date.year(), date);
        }
        self
    }

    /// Midnight UTC+8 on the festival day, or `None` when the year is not in the table.
    pub fn festival_start(&self, season: Season, year: i32) -> Option<NaiveDateTime> {
        let day = match season {
            Season::Christmas => NaiveDate::from_ymd_opt(year, 12, 25),
            Season::Spring => self.spring.get(&year).copied(),
        };
        day.map(|d| d.and_time(NaiveTime::MIN))
    }

    pub fn is_unlocked(&self, season: Season, year: i32, now: DateTime<Utc>) -> bool {
        match self.festival_start(season, year) {
            Some(start) => china_local(now) >= start,
            None => {
                tracing::debug!("No {} festival date for {}, content stays locked", season, year);
                false
            }
        }
    }

    /// Date rule combined with the debug override.
    pub fn resolve(
        &self,
        season: Season,
        year: i32,
        now: DateTime<Utc>,
        unlock: UnlockOverride,
    ) -> bool {
        if unlock.is_forced() {
            tracing::debug!("Unlock override forced {} {} open", season, year);
            return true;
        }
        self.is_unlocked(season, year, now)
    }

    pub fn spring_years(&self) -> impl Iterator<Item = i32> + '_ {
        self.spring.keys().copied()
    }

    /// Warns once for a spring year the table does not cover. Returns
    /// whether the year is missing.
    pub fn warn_if_spring_missing(&self, year: i32) -> bool {
        let missing = !self.spring.contains_key(&year);
        if missing {
            tracing::warn!(
                "No spring festival date configured for {}, set SPRING_FESTIVAL_DATES",
                year
            );
        }
        missing
    }
}

/// `?unlock=true` on the read endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct UnlockQuery {
    pub unlock: Option<bool>,
}

/// Testing escape hatch that opens all content regardless of date.
/// Only honoured when the deployment allows it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnlockOverride(bool);

impl UnlockOverride {
    pub fn from_request(allowed: bool, query: &UnlockQuery) -> Self {
        let requested = query.unlock.unwrap_or(false);
        if requested && !allowed {
            tracing::debug!("Ignoring unlock override, disabled in this deployment");
        }
        Self(allowed && requested)
    }

    pub fn is_forced(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn christmas_opens_at_midnight_china_time() {
        let calendar = FestivalCalendar::default();
        // 2025-12-24 15:59 UTC is 23:59 in UTC+8.
        assert!(!calendar.is_unlocked(Season::Christmas, 2025, utc(2025, 12, 24, 15, 59)));
        assert!(calendar.is_unlocked(Season::Christmas, 2025, utc(2025, 12, 24, 16, 0)));
        assert!(calendar.is_unlocked(Season::Christmas, 2025, utc(2025, 12, 31, 12, 0)));
    }

    #[test]
    fn christmas_stays_open_after_new_year() {
        let calendar = FestivalCalendar::default();
        assert!(calendar.is_unlocked(Season::Christmas, 2025, utc(2026, 1, 3, 0, 0)));
        assert!(!calendar.is_unlocked(Season::Christmas, 2026, utc(2026, 1, 3, 0, 0)));
    }

    #[test]
    fn spring_uses_year_table() {
        let calendar = FestivalCalendar::default();
        assert!(!calendar.is_unlocked(Season::Spring, 2026, utc(2026, 2, 16, 15, 59)));
        assert!(calendar.is_unlocked(Season::Spring, 2026, utc(2026, 2, 16, 16, 0)));
        assert!(calendar.is_unlocked(Season::Spring, 2025, utc(2025, 1, 28, 16, 0)));
        assert!(!calendar.is_unlocked(Season::Spring, 2024, utc(2024, 2, 9, 12, 0)));
        assert!(calendar.is_unlocked(Season::Spring, 2027, utc(2027, 2, 6, 0, 0)));
    }

    #[test]
    fn spring_year_outside_table_never_opens() {
        let calendar = FestivalCalendar::default();
        assert!(!calendar.is_unlocked(Season::Spring, 2030, utc(2030, 12, 31, 0, 0)));
        assert!(calendar.festival_start(Season::Spring, 2030).is_none());
        assert!(calendar.warn_if_spring_missing(2030));
        assert!(!calendar.warn_if_spring_missing(2026));
    }

    #[test]
    fn configured_dates_extend_table() {
        let calendar = FestivalCalendar::default()
            .with_spring_dates([NaiveDate::from_ymd_opt(2028, 1, 26).unwrap()]);
        assert!(calendar.is_unlocked(Season::Spring, 2028, utc(2028, 1, 25, 16, 0)));
        assert_eq!(calendar.spring_years().collect::<Vec<_>>(), vec![2024, 2025, 2026, 2027, 2028]);
    }

    #[test]
    fn unlock_is_a_step_function() {
        let calendar = FestivalCalendar::default();
        let start = utc(2026, 1, 1, 0, 0);
        let mut seen_open = false;
        for hour in 0..(24 * 120) {
            let now = start + Duration::hours(hour);
            let open = calendar.is_unlocked(Season::Spring, 2026, now);
            if seen_open {
                assert!(open, "relocked at {}", now);
            }
            seen_open |= open;
        }
        assert!(seen_open);
    }

    #[test]
    fn override_requires_permission() {
        let asked = UnlockQuery { unlock: Some(true) };
        assert!(!UnlockOverride::from_request(false, &asked).is_forced());
        assert!(UnlockOverride::from_request(true, &asked).is_forced());
        assert!(!UnlockOverride::from_request(true, &UnlockQuery::default()).is_forced());

        let calendar = FestivalCalendar::default();
        let before = utc(2026, 1, 1, 0, 0);
        let forced = UnlockOverride::from_request(true, &asked);
        assert!(calendar.resolve(Season::Spring, 2026, before, forced));
        assert!(!calendar.resolve(Season::Spring, 2026, before, UnlockOverride::default()));
    }

    #[test]
    fn current_year_follows_china_time() {
        assert_eq!(current_year(utc(2025, 12, 31, 15, 59)), 2025);
        assert_eq!(current_year(utc(2025, 12, 31, 16, 0)), 2026);
    }
}
