use std::fmt;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Set of days a timetable applies to.
///
/// ISO weekday `d` (1 = Monday .. 7 = Sunday) is stored in bit `d - 1`,
/// which is the integer the backend keeps in `timetables.weekdays`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Weekdays(u8);

const ALL_BITS: u8 = 0b111_1111;

const SHORT_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

impl Weekdays {
    pub const NONE: Weekdays = Weekdays(0);
    pub const WORKDAYS: Weekdays = Weekdays(0b001_1111);
    pub const ALL: Weekdays = Weekdays(ALL_BITS);

    /// Unknown high bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & ALL_BITS)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Build from ISO day numbers. Returns `None` if any day is outside 1..=7.
    pub fn from_iso_days(days: &[u32]) -> Option<Self> {
        days.iter().try_fold(Self::NONE, |acc, &day| {
            (1..=7)
                .contains(&day)
                .then(|| Self(acc.0 | (1 << (day - 1))))
        })
    }

    /// ISO day numbers in ascending order.
    pub fn iso_days(self) -> Vec<u32> {
        (1..=7u32).filter(|d| self.0 & (1 << (d - 1)) != 0).collect()
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | (1 << day.num_days_from_monday()))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<u8> for Weekdays {
    fn from(bits: u8) -> Self {
        Self::from_bits(bits)
    }
}

impl From<Weekdays> for u8 {
    fn from(days: Weekdays) -> Self {
        days.0
    }
}

impl fmt::Display for Weekdays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .iso_days()
            .into_iter()
            .map(|d| SHORT_NAMES[(d - 1) as usize])
            .collect();
        if names.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&names.join(", "))
        }
    }
}
