use serde::{Deserialize, Serialize};

use super::validation::{ProblemKind, ValidationError, Validator};

/// Largest audio file the backend accepts (2 MiB)
pub const MAX_SOUND_FILE_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Sound {
    pub id: i64,
    pub name: String,
    pub filename: String,
}

/// An audio file waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct SoundUpload {
    pub name: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl SoundUpload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.name("name", &self.name);
        if self.bytes.is_empty() {
            v.push("sound_file", ProblemKind::Required);
        } else if self.bytes.len() > MAX_SOUND_FILE_SIZE {
            v.push("sound_file", ProblemKind::FileTooLarge { max: MAX_SOUND_FILE_SIZE });
        }
        if !self.mime.starts_with("audio/") {
            v.push("sound_file", ProblemKind::UnsupportedFileType(self.mime.clone()));
        }
        v.finish()
    }
}
