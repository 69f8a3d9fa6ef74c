//! Client-side input checks shared by the draft types.

use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

pub const MIN_NAME_LENGTH: usize = 2;
pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemKind {
    Required,
    TooShort { min: usize },
    TooLong { max: usize },
    /// End date must come after start date
    DateOrder,
    NoWeekdays,
    InvalidTime,
    FileTooLarge { max: usize },
    UnsupportedFileType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProblem {
    pub field: &'static str,
    pub kind: ProblemKind,
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ProblemKind::Required => write!(f, "{} is required", self.field),
            ProblemKind::TooShort { min } => {
                write!(f, "{} must be at least {} characters", self.field, min)
            }
            ProblemKind::TooLong { max } => {
                write!(f, "{} must be at most {} characters", self.field, max)
            }
            ProblemKind::DateOrder => write!(f, "{} must be later than the start date", self.field),
            ProblemKind::NoWeekdays => write!(f, "{} needs at least one day", self.field),
            ProblemKind::InvalidTime => write!(f, "{} must be a time as HH:MM", self.field),
            ProblemKind::FileTooLarge { max } => {
                write!(f, "{} is larger than {} bytes", self.field, max)
            }
            ProblemKind::UnsupportedFileType(mime) => {
                write!(f, "{} has unsupported type {}", self.field, mime)
            }
        }
    }
}

fn join_problems(problems: &[FieldProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid input: {}", join_problems(.problems))]
pub struct ValidationError {
    pub problems: Vec<FieldProblem>,
}

impl ValidationError {
    pub fn has(&self, field: &str) -> bool {
        self.problems.iter().any(|p| p.field == field)
    }
}

/// Collects problems so a form can report all of them at once.
#[derive(Default)]
pub(crate) struct Validator {
    problems: Vec<FieldProblem>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, kind: ProblemKind) {
        self.problems.push(FieldProblem { field, kind });
    }

    pub fn name(&mut self, field: &'static str, value: &str) {
        let value = value.trim();
        let len = value.chars().count();
        if value.is_empty() {
            self.push(field, ProblemKind::Required);
        } else if len < MIN_NAME_LENGTH {
            self.push(field, ProblemKind::TooShort { min: MIN_NAME_LENGTH });
        } else if len > MAX_NAME_LENGTH {
            self.push(field, ProblemKind::TooLong { max: MAX_NAME_LENGTH });
        }
    }

    pub fn max_len(&mut self, field: &'static str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.push(field, ProblemKind::TooLong { max });
        }
    }

    pub fn date_order(&mut self, field: &'static str, from: NaiveDate, until: Option<NaiveDate>) {
        if let Some(until) = until {
            if until <= from {
                self.push(field, ProblemKind::DateOrder);
            }
        }
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                problems: self.problems,
            })
        }
    }
}
