//! crates/cv_core/src/month.rs
//! Reporting month ("YYYY-MM"), the bucket key of every performance count.

use core::fmt;
use core::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};

use crate::errors::CoreError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self, CoreError> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(CoreError::InvalidMonth(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn first_day(self) -> NaiveDate {
        // Construction guarantees a valid month.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.first_day()
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn of_date(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    /// The month covered by a `Begin_Date`/`End_Date` pair, which must span
    /// exactly the first to the last day of one month.
    pub fn from_period(begin: &str, end: &str) -> Result<Self, CoreError> {
        let b = parse_date(begin)?;
        let e = parse_date(end)?;
        let m = Month::of_date(b);
        if b != m.first_day() || e != m.last_day() {
            return Err(CoreError::InvalidPeriod { begin: begin.to_string(), end: end.to_string() });
        }
        Ok(m)
    }

    /// Tabular column heading, `Mmm-yyyy` (e.g. `Jan-2024`).
    pub fn from_heading(heading: &str) -> Result<Self, CoreError> {
        let with_day = format!("01-{}", heading.trim());
        NaiveDate::parse_from_str(&with_day, "%d-%b-%Y")
            .map(Month::of_date)
            .map_err(|_| CoreError::InvalidMonth(heading.to_string()))
    }

    /// Inverse of `from_heading`.
    pub fn heading(self) -> String {
        self.first_day().format("%b-%Y").to_string()
    }
}

/// Strict ISO `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, CoreError> {
    if s.len() != 10 {
        return Err(CoreError::InvalidDate(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| CoreError::InvalidDate(s.to_string()))
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = CoreError;

    /// Strict `YYYY-MM`; anything else (including `YYYY-M`) is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        let shaped = b.len() == 7
            && b[4] == b'-'
            && b.iter().enumerate().all(|(i, c)| i == 4 || c.is_ascii_digit());
        if !shaped {
            return Err(CoreError::InvalidMonth(s.to_string()));
        }
        let year: i32 = s[0..4].parse().map_err(|_| CoreError::InvalidMonth(s.to_string()))?;
        let month: u32 = s[5..7].parse().map_err(|_| CoreError::InvalidMonth(s.to_string()))?;
        Month::new(year, month).map_err(|_| CoreError::InvalidMonth(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_strictly() {
        let m: Month = "2024-02".parse().unwrap();
        assert_eq!(m.to_string(), "2024-02");
        assert!("2024-2".parse::<Month>().is_err());
        assert!("2024-13".parse::<Month>().is_err());
        assert!("24-02-01".parse::<Month>().is_err());
    }

    #[test]
    fn period_must_cover_one_full_month() {
        let m = Month::from_period("2024-02-01", "2024-02-29").unwrap();
        assert_eq!(m.to_string(), "2024-02");
        assert!(Month::from_period("2024-02-01", "2024-02-28").is_err());
        assert!(Month::from_period("2024-01-01", "2024-02-29").is_err());
        assert_eq!(Month::new(2023, 12).unwrap().last_day().to_string(), "2023-12-31");
    }

    #[test]
    fn tabular_headings_round_trip() {
        let m = Month::from_heading("Jan-2024").unwrap();
        assert_eq!(m.to_string(), "2024-01");
        assert_eq!(m.heading(), "Jan-2024");
        assert!(Month::from_heading("Foo-2024").is_err());
    }
}
