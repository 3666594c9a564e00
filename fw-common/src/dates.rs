//! Date utilities for imagery selection
//!
//! Analysis requests carry ISO calendar dates (`YYYY-MM-DD`). Imagery
//! browsing is grouped by calendar quarter (`YYYY-Qn`).

use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse an ISO calendar date (`YYYY-MM-DD`)
pub fn parse_iso_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        Error::InvalidInput(format!(
            "Invalid date format '{}'. Use YYYY-MM-DD",
            value
        ))
    })
}

/// Three-month calendar bucket, e.g. `2020-Q1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quarter {
    year: i32,
    quarter: u32,
}

impl Quarter {
    /// Create a quarter; `quarter` must be 1..=4
    pub fn new(year: i32, quarter: u32) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(Error::InvalidInput(format!(
                "Quarter must be between 1 and 4, got {}",
                quarter
            )));
        }
        Ok(Self { year, quarter })
    }

    /// Quarter containing `date`
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: (date.month0() / 3) + 1,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u32 {
        self.quarter
    }

    /// First day of the quarter (inclusive)
    pub fn start(&self) -> NaiveDate {
        let month = (self.quarter - 1) * 3 + 1;
        NaiveDate::from_ymd_opt(self.year, month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following quarter (exclusive end)
    pub fn end(&self) -> NaiveDate {
        self.next().start()
    }

    /// The quarter after this one
    pub fn next(&self) -> Self {
        if self.quarter == 4 {
            Self {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }

    /// Whether `date` falls within `[start, end)`
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date < self.end()
    }
}

impl FromStr for Quarter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidInput(format!(
                "Invalid quarter '{}'. Use YYYY-Qn (e.g. 2020-Q1)",
                s
            ))
        };

        let (year, quarter) = s.trim().split_once("-Q").ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let quarter: u32 = quarter.parse().map_err(|_| invalid())?;
        Quarter::new(year, quarter).map_err(|_| invalid())
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}
