//! Monthly post aggregates, home assignments and migration flows.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MobilityError;

/// Calendar month label, written as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, MobilityError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|d| Self {
                year: d.year(),
                month: d.month(),
            })
            .ok_or_else(|| MobilityError::InvalidMonth(format!("{}-{}", year, month)))
    }

    /// The following calendar month
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = MobilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let date = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
            .map_err(|_| MobilityError::InvalidMonth(s.to_string()))?;
        Ok(Self {
            year: date.year(),
            month: date.month(),
        })
    }
}

impl TryFrom<String> for YearMonth {
    type Error = MobilityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Number of a user's resolvable posts in one locality during one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPostCount {
    pub user_id: String,
    pub locality: String,
    pub count: u64,
}

impl UserPostCount {
    pub fn new(user_id: impl Into<String>, locality: impl Into<String>, count: u64) -> Self {
        Self {
            user_id: user_id.into(),
            locality: locality.into(),
            count,
        }
    }
}

/// Inferred home of a user for one month. `home` is `None` when the
/// evidence is not strong enough for a confident assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHomeAssignment {
    pub user_id: String,
    pub month: YearMonth,
    pub home: Option<String>,
}

/// All home assignments of one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyHomes {
    pub month: YearMonth,
    pub assignments: Vec<UserHomeAssignment>,
}

impl MonthlyHomes {
    /// Number of users with a confident home
    pub fn assigned(&self) -> usize {
        self.assignments.iter().filter(|a| a.home.is_some()).count()
    }
}

/// Count of users whose home moved from `origin` to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFlow {
    pub origin: String,
    pub destination: String,
    pub flow: u64,
    pub month_start: YearMonth,
    pub month_end: YearMonth,
}

/// Per-locality summary of a set of flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetMigration {
    pub locality: String,
    pub inflow: u64,
    pub outflow: u64,
    pub net: i64,
}
