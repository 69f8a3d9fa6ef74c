use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use super::timetable::{format_event_time, TimetableEventDraft};
use super::validation::{ProblemKind, ValidationError, Validator, MAX_DESCRIPTION_LENGTH};

/// `base` shifted by `offset_minutes`, wrapping around midnight.
pub fn offset_time(base: NaiveTime, offset_minutes: i32) -> NaiveTime {
    let (time, _) = base.overflowing_add_signed(Duration::minutes(offset_minutes as i64));
    time
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct EventTemplateItem {
    pub id: i64,
    pub template_id: i64,
    pub offset_minutes: i32,
    pub event_name: String,
    pub sound_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct EventTemplate {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<EventTemplateItem>,
}

impl EventTemplate {
    /// Timetable events produced by placing this template at `base`.
    ///
    /// Every event is tagged with the template id; items with a zero offset
    /// are marked as the template's base event.
    pub fn expand(&self, base: NaiveTime) -> Vec<TimetableEventDraft> {
        let mut items: Vec<&EventTemplateItem> = self.items.iter().collect();
        items.sort_by_key(|item| item.offset_minutes);
        items
            .into_iter()
            .map(|item| TimetableEventDraft {
                event_name: item.event_name.clone(),
                event_time: format_event_time(offset_time(base, item.offset_minutes)),
                sound_id: item.sound_id,
                template_instance_id: Some(self.id),
                is_template_base: item.offset_minutes == 0,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTemplateItemDraft {
    pub event_name: String,
    pub offset_minutes: i32,
    pub sound_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTemplateDraft {
    pub name: String,
    pub description: Option<String>,
    pub items: Vec<EventTemplateItemDraft>,
}

impl EventTemplateDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.name("name", &self.name);
        if let Some(ref description) = self.description {
            v.max_len("description", description, MAX_DESCRIPTION_LENGTH);
        }
        if self.items.iter().any(|i| i.event_name.trim().is_empty()) {
            v.push("items", ProblemKind::Required);
        }
        v.finish()
    }
}

impl From<&EventTemplate> for EventTemplateDraft {
    fn from(t: &EventTemplate) -> Self {
        Self {
            name: t.name.clone(),
            description: t.description.clone(),
            items: t
                .items
                .iter()
                .map(|i| EventTemplateItemDraft {
                    event_name: i.event_name.clone(),
                    offset_minutes: i.offset_minutes,
                    sound_id: i.sound_id,
                })
                .collect(),
        }
    }
}
