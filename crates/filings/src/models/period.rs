//! Quarterly reporting periods.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The reporting quarter a 13F disclosure covers, rendered as `"2024Q1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilingPeriod {
    year: i32,
    quarter: u8,
}

/// Error returned when a period string or quarter number is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid filing period '{0}', expected YYYYQn")]
pub struct InvalidPeriod(pub String);

impl FilingPeriod {
    pub fn new(year: i32, quarter: u8) -> Result<Self, InvalidPeriod> {
        if !(1..=4).contains(&quarter) || !(1900..=9999).contains(&year) {
            return Err(InvalidPeriod(format!("{}Q{}", year, quarter)));
        }
        Ok(Self { year, quarter })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    /// The quarter containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: ((date.month() - 1) / 3 + 1) as u8,
        }
    }

    /// Last calendar day of the quarter (the 13F "period of report").
    pub fn end_date(&self) -> NaiveDate {
        let (month, day) = match self.quarter {
            1 => (3, 31),
            2 => (6, 30),
            3 => (9, 30),
            _ => (12, 31),
        };
        NaiveDate::from_ymd_opt(self.year, month, day).unwrap_or(NaiveDate::MIN)
    }

    pub fn previous(&self) -> Self {
        if self.quarter == 1 {
            Self {
                year: self.year - 1,
                quarter: 4,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter - 1,
            }
        }
    }

    /// The `count` most recent quarters that ended strictly before `today`,
    /// newest first.
    pub fn recent_elapsed(today: NaiveDate, count: usize) -> Vec<Self> {
        let mut period = Self::containing(today).previous();
        let mut periods = Vec::with_capacity(count);
        for _ in 0..count {
            periods.push(period);
            period = period.previous();
        }
        periods
    }
}

impl fmt::Display for FilingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for FilingPeriod {
    type Err = InvalidPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (year, quarter) = trimmed
            .split_once(['Q', 'q'])
            .ok_or_else(|| InvalidPeriod(s.to_string()))?;
        let year: i32 = year.parse().map_err(|_| InvalidPeriod(s.to_string()))?;
        let quarter: u8 = quarter.parse().map_err(|_| InvalidPeriod(s.to_string()))?;
        Self::new(year, quarter).map_err(|_| InvalidPeriod(s.to_string()))
    }
}

impl Serialize for FilingPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FilingPeriod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
