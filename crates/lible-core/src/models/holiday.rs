use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::validation::{ValidationError, Validator};

/// A break during which no bells ring. Both ends are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Holiday {
    pub id: i64,
    pub name: String,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
}

impl Holiday {
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && date <= self.valid_until
    }

    pub fn length_days(&self) -> i64 {
        (self.valid_until - self.valid_from).num_days() + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolidayDraft {
    pub name: String,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
}

impl HolidayDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.name("name", &self.name);
        v.date_order("valid_until", self.valid_from, Some(self.valid_until));
        v.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_covers_inclusive_range() {
        let h = Holiday {
            id: 1,
            name: "Talvevaheaeg".into(),
            valid_from: date("2024-12-21"),
            valid_until: date("2025-01-05"),
        };
        assert!(h.covers(date("2024-12-21")));
        assert!(h.covers(date("2025-01-05")));
        assert!(!h.covers(date("2025-01-06")));
        assert_eq!(h.length_days(), 16);
    }

    #[test]
    fn test_draft_requires_later_end() {
        let draft = HolidayDraft {
            name: "Kevadvaheaeg".into(),
            valid_from: date("2025-03-24"),
            valid_until: date("2025-03-24"),
        };
        assert!(draft.validate().unwrap_err().has("valid_until"));
    }
}
