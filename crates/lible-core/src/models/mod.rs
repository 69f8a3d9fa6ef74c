//! Data models for the bell-schedule backend.
//!
//! This module contains the records the console manages:
//!
//! - `Timetable`, `TimetableEvent`: weekly schedules and their bell times
//! - `EventTemplate`, `EventTemplateItem`: reusable offset-based event groups
//! - `Sound`: uploaded audio played at event times
//! - `Holiday`: date ranges with no bells
//! - `Weekdays`: the ISO-weekday bitmask used by timetables
//!
//! Each writable record has a `*Draft` counterpart carrying client-side
//! validation that runs before anything is sent.

pub mod holiday;
pub mod sound;
pub mod template;
pub mod timetable;
pub mod user;
pub mod validation;
pub mod weekdays;

pub use holiday::{Holiday, HolidayDraft};
pub use sound::{Sound, SoundUpload, MAX_SOUND_FILE_SIZE};
pub use template::{offset_time, EventTemplate, EventTemplateDraft, EventTemplateItem, EventTemplateItemDraft};
pub use timetable::{format_event_time, parse_event_time, Timetable, TimetableDraft, TimetableEvent, TimetableEventDraft};
pub use user::User;
pub use validation::{FieldProblem, ProblemKind, ValidationError};
pub use weekdays::Weekdays;
