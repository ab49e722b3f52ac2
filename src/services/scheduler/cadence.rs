// File: src/services/scheduler/cadence.rs
use crate::utils::time::{is_weekend, local_to_utc};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, Utc, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;

/// Сколько дней вперёд ищется следующий запуск
const LOOKAHEAD_DAYS: u64 = 8;

/// When a job fires, in wall-clock time of the scheduler timezone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cadence {
    /// Every `interval_seconds`, counted from `window_start` (or midnight),
    /// up to and including `window_end` (or the end of the day).
    Every {
        interval_seconds: u64,
        #[serde(default)]
        window_start: Option<NaiveTime>,
        #[serde(default)]
        window_end: Option<NaiveTime>,
        #[serde(default)]
        weekdays_only: bool,
    },
    Daily {
        at: NaiveTime,
        #[serde(default)]
        weekdays_only: bool,
    },
    Weekly {
        weekday: Weekday,
        at: NaiveTime,
    },
}

impl Cadence {
    /// First fire time strictly after `now`. Local times inside a DST gap are skipped.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&tz).date_naive();

        (0..LOOKAHEAD_DAYS)
            .filter_map(|offset| today.checked_add_days(Days::new(offset)))
            .find_map(|day| self.next_on(day, now, tz))
    }

    fn next_on(&self, day: NaiveDate, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            Cadence::Every {
                interval_seconds,
                window_start,
                window_end,
                weekdays_only,
            } => {
                if *weekdays_only && is_weekend(day) {
                    return None;
                }
                let interval = TimeDelta::seconds((*interval_seconds).max(1) as i64);
                let start = local_to_utc(day.and_time(window_start.unwrap_or(NaiveTime::MIN)), tz)?;
                let end = match window_end {
                    Some(end) => local_to_utc(day.and_time(*end), tz)?,
                    None => local_to_utc(day.succ_opt()?.and_time(NaiveTime::MIN), tz)? - TimeDelta::seconds(1),
                };

                let candidate = if now < start {
                    start
                } else {
                    let elapsed = (now - start).num_seconds();
                    let steps = elapsed / interval.num_seconds() + 1;
                    start + interval * steps as i32
                };

                (candidate <= end).then_some(candidate)
            }
            Cadence::Daily { at, weekdays_only } => {
                if *weekdays_only && is_weekend(day) {
                    return None;
                }
                local_to_utc(day.and_time(*at), tz).filter(|candidate| *candidate > now)
            }
            Cadence::Weekly { weekday, at } => {
                if day.weekday() != *weekday {
                    return None;
                }
                local_to_utc(day.and_time(*at), tz).filter(|candidate| *candidate > now)
            }
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = |weekdays_only: bool| if weekdays_only { " on weekdays" } else { "" };
        match self {
            Cadence::Every {
                interval_seconds,
                window_start,
                window_end,
                weekdays_only,
            } => {
                write!(f, "every {}s", interval_seconds)?;
                if let (Some(start), Some(end)) = (window_start, window_end) {
                    write!(f, " between {} and {}", start.format("%H:%M"), end.format("%H:%M"))?;
                }
                write!(f, "{}", days(*weekdays_only))
            }
            Cadence::Daily { at, weekdays_only } => {
                write!(f, "daily at {}{}", at.format("%H:%M"), days(*weekdays_only))
            }
            Cadence::Weekly { weekday, at } => write!(f, "weekly on {} at {}", weekday, at.format("%H:%M")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn market_hours(interval_seconds: u64) -> Cadence {
        Cadence::Every {
            interval_seconds,
            window_start: Some(time(9, 30)),
            window_end: Some(time(16, 30)),
            weekdays_only: true,
        }
    }

    #[test]
    fn test_every_inside_window() {
        // Среда 11:00 по Нью-Йорку, ровно на сетке -> следующий запуск 11:10
        let next = market_hours(600).next_after(utc(2024, 8, 7, 15, 0), New_York);
        assert_eq!(next, Some(utc(2024, 8, 7, 15, 10)));

        let next = market_hours(600).next_after(utc(2024, 8, 7, 15, 3), New_York);
        assert_eq!(next, Some(utc(2024, 8, 7, 15, 10)));
    }

    #[test]
    fn test_every_before_and_after_window() {
        let before_open = market_hours(600).next_after(utc(2024, 8, 7, 12, 0), New_York);
        assert_eq!(before_open, Some(utc(2024, 8, 7, 13, 30)));

        let after_close = market_hours(600).next_after(utc(2024, 8, 7, 20, 31), New_York);
        assert_eq!(after_close, Some(utc(2024, 8, 8, 13, 30)));

        // Окно включает 16:30
        let last = market_hours(600).next_after(utc(2024, 8, 7, 20, 25), New_York);
        assert_eq!(last, Some(utc(2024, 8, 7, 20, 30)));
    }

    #[test]
    fn test_every_skips_weekend() {
        let friday_evening = utc(2024, 8, 9, 21, 0);
        let next = market_hours(60).next_after(friday_evening, New_York);
        assert_eq!(next, Some(utc(2024, 8, 12, 13, 30)));
    }

    #[test]
    fn test_every_without_window_runs_around_the_clock() {
        let cadence = Cadence::Every {
            interval_seconds: 3600,
            window_start: None,
            window_end: None,
            weekdays_only: false,
        };
        // Суббота 23:30 по Нью-Йорку -> полночь воскресенья
        let next = cadence.next_after(utc(2024, 8, 11, 3, 30), New_York);
        assert_eq!(next, Some(utc(2024, 8, 11, 4, 0)));
    }

    #[test]
    fn test_daily_weekdays_only() {
        let cadence = Cadence::Daily {
            at: time(17, 30),
            weekdays_only: true,
        };
        // Пятница 18:00 по Нью-Йорку -> понедельник 17:30
        let next = cadence.next_after(utc(2024, 8, 9, 22, 0), New_York);
        assert_eq!(next, Some(utc(2024, 8, 12, 21, 30)));
    }

    #[test]
    fn test_weekly() {
        let cadence = Cadence::Weekly {
            weekday: Weekday::Sun,
            at: time(2, 0),
        };
        let next = cadence.next_after(utc(2024, 8, 7, 15, 0), New_York);
        assert_eq!(next, Some(utc(2024, 8, 11, 6, 0)));
    }

    #[test]
    fn test_daily_skips_dst_gap() {
        let cadence = Cadence::Daily {
            at: time(2, 30),
            weekdays_only: false,
        };
        // 10.03.2024 02:30 не существует в Нью-Йорке
        let next = cadence.next_after(utc(2024, 3, 10, 5, 0), New_York);
        assert_eq!(next, Some(utc(2024, 3, 11, 6, 30)));
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            cadence: Cadence,
        }

        let parsed: Wrapper =
            toml::from_str(r#"cadence = { kind = "weekly", weekday = "Sun", at = "02:00:00" }"#).unwrap();
        assert_eq!(
            parsed.cadence,
            Cadence::Weekly {
                weekday: Weekday::Sun,
                at: time(2, 0)
            }
        );

        let parsed: Wrapper = toml::from_str(r#"cadence = { kind = "daily", at = "17:30:00" }"#).unwrap();
        assert_eq!(
            parsed.cadence,
            Cadence::Daily {
                at: time(17, 30),
                weekdays_only: false
            }
        );
    }
}
