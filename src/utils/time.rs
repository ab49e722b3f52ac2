use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Default market timezone for equities.
pub const DEFAULT_MARKET_TZ: Tz = chrono_tz::America::New_York;

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Trading day strictly before `date`.
pub fn previous_trading_day(date: NaiveDate, always_open: bool) -> NaiveDate {
    let mut current = date.checked_sub_days(Days::new(1)).unwrap_or(date);
    while !always_open && is_weekend(current) {
        current = current.checked_sub_days(Days::new(1)).unwrap_or(current);
    }
    current
}

/// Today in `tz`, rolled back to Friday on weekends unless the market never closes.
pub fn last_trading_day(now: DateTime<Utc>, tz: Tz, always_open: bool) -> NaiveDate {
    let today = now.with_timezone(&tz).date_naive();
    if always_open || !is_weekend(today) {
        today
    } else {
        previous_trading_day(today, false)
    }
}

/// Trading days within `[start, end]`, ascending.
pub fn trading_days(start: NaiveDate, end: NaiveDate, always_open: bool) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| always_open || !is_weekend(*day))
        .collect()
}

/// Local wall-clock time in `tz` to UTC. Ambiguous times pick the earlier instant,
/// non-existent ones (DST gap) yield None.
pub fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
