use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::validation::{ProblemKind, ValidationError, Validator};
use super::{Holiday, Weekdays};

const EVENT_TIME_FORMAT: &str = "%H:%M";

/// Parse an event time as stored by the backend. Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_event_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, EVENT_TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

pub fn format_event_time(time: NaiveTime) -> String {
    time.format(EVENT_TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Timetable {
    pub id: i64,
    pub name: String,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub weekdays: Weekdays,
    #[serde(default)]
    pub events: Vec<TimetableEvent>,
}

impl Timetable {
    /// Whether bells from this timetable ring on `date`.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        date >= self.valid_from
            && self.valid_until.map_or(true, |until| date <= until)
            && self.weekdays.contains(date.weekday())
    }

    /// Like [`is_active_on`](Self::is_active_on), but silent on holidays.
    pub fn rings_on(&self, date: NaiveDate, holidays: &[Holiday]) -> bool {
        self.is_active_on(date) && !holidays.iter().any(|h| h.covers(date))
    }
}

/// Body for creating or replacing a timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimetableDraft {
    pub name: String,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub weekdays: Weekdays,
}

impl TimetableDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.name("name", &self.name);
        v.date_order("valid_until", self.valid_from, self.valid_until);
        if self.weekdays.is_empty() {
            v.push("weekdays", ProblemKind::NoWeekdays);
        }
        v.finish()
    }
}

impl From<&Timetable> for TimetableDraft {
    fn from(t: &Timetable) -> Self {
        Self {
            name: t.name.clone(),
            valid_from: t.valid_from,
            valid_until: t.valid_until,
            weekdays: t.weekdays,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TimetableEvent {
    pub id: i64,
    pub timetable_id: i64,
    pub event_name: String,
    pub event_time: String,
    pub sound_id: i64,
    #[serde(default)]
    pub template_instance_id: Option<i64>,
    #[serde(default)]
    pub is_template_base: bool,
}

impl TimetableEvent {
    pub fn time(&self) -> Option<NaiveTime> {
        parse_event_time(&self.event_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimetableEventDraft {
    pub event_name: String,
    pub event_time: String,
    pub sound_id: i64,
    pub template_instance_id: Option<i64>,
    pub is_template_base: bool,
}

impl TimetableEventDraft {
    pub fn new(event_name: &str, time: NaiveTime, sound_id: i64) -> Self {
        Self {
            event_name: event_name.to_string(),
            event_time: format_event_time(time),
            sound_id,
            template_instance_id: None,
            is_template_base: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        if self.event_name.trim().is_empty() {
            v.push("event_name", ProblemKind::Required);
        }
        if parse_event_time(&self.event_time).is_none() {
            v.push("event_time", ProblemKind::InvalidTime);
        }
        v.finish()
    }
}
