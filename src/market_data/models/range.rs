use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named lookback window for a backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HistoricalRange {
    SevenDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    YearToDate,
    OneYear,
    ThreeYears,
    FiveYears,
    Max,
}

/// Inclusive calendar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn day_count(&self) -> u32 {
        ((self.end - self.start).num_days() + 1).max(0) as u32
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl HistoricalRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoricalRange::SevenDays => "7D",
            HistoricalRange::OneMonth => "1M",
            HistoricalRange::ThreeMonths => "3M",
            HistoricalRange::SixMonths => "6M",
            HistoricalRange::YearToDate => "YTD",
            HistoricalRange::OneYear => "1Y",
            HistoricalRange::ThreeYears => "3Y",
            HistoricalRange::FiveYears => "5Y",
            HistoricalRange::Max => "MAX",
        }
    }

    /// Resolves to `[start, today]`. No window reaches further back than
    /// `max_lookback_years`, MAX resolves exactly to that ceiling.
    pub fn resolve(&self, today: NaiveDate, max_lookback_years: u32) -> DateWindow {
        let ceiling = months_back(today, max_lookback_years.saturating_mul(12));

        let start = match self {
            HistoricalRange::SevenDays => today.checked_sub_days(Days::new(7)).unwrap_or(today),
            HistoricalRange::OneMonth => months_back(today, 1),
            HistoricalRange::ThreeMonths => months_back(today, 3),
            HistoricalRange::SixMonths => months_back(today, 6),
            HistoricalRange::YearToDate => {
                NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today)
            }
            HistoricalRange::OneYear => months_back(today, 12),
            HistoricalRange::ThreeYears => months_back(today, 36),
            HistoricalRange::FiveYears => months_back(today, 60),
            HistoricalRange::Max => ceiling,
        };

        DateWindow {
            start: start.max(ceiling),
            end: today,
        }
    }
}

fn months_back(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

impl FromStr for HistoricalRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "7D" => Ok(HistoricalRange::SevenDays),
            "1M" => Ok(HistoricalRange::OneMonth),
            "3M" => Ok(HistoricalRange::ThreeMonths),
            "6M" => Ok(HistoricalRange::SixMonths),
            "YTD" => Ok(HistoricalRange::YearToDate),
            "1Y" => Ok(HistoricalRange::OneYear),
            "3Y" => Ok(HistoricalRange::ThreeYears),
            "5Y" => Ok(HistoricalRange::FiveYears),
            "MAX" => Ok(HistoricalRange::Max),
            other => Err(format!("Unknown historical range: {}", other)),
        }
    }
}

impl TryFrom<String> for HistoricalRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HistoricalRange> for String {
    fn from(range: HistoricalRange) -> Self {
        range.as_str().to_string()
    }
}

impl fmt::Display for HistoricalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
