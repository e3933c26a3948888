use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::models::error::RecorderError;

/// Give up after this many suffixed names collide within one millisecond.
const MAX_ATTEMPTS: u32 = 1000;

/// Hands out unique, time-stamped file names under one directory.
///
/// Names look like `audio_1760742301123.aac`; when that name is taken a
/// numeric suffix is added (`audio_1760742301123_1.aac`). The file is
/// created with `create_new`, so the existence check and the reservation
/// are a single atomic step.
#[derive(Debug, Clone)]
pub struct PathAllocator {
    directory: PathBuf,
    prefix: String,
    extension: String,
}

impl PathAllocator {
    pub fn new(directory: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            directory: directory.into(),
            prefix: "audio".to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the directory if needed and reserve a new empty file in it.
    pub fn allocate(&self) -> Result<(PathBuf, File), RecorderError> {
        fs::create_dir_all(&self.directory).map_err(|e| {
            RecorderError::StorageError(format!(
                "failed to create directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        let stamp = chrono::Utc::now().timestamp_millis();
        for attempt in 0..MAX_ATTEMPTS {
            let path = self.directory.join(self.file_name(stamp, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(RecorderError::StorageError(format!(
                        "failed to create {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        Err(RecorderError::StorageError(format!(
            "no free file name for timestamp {} in {}",
            stamp,
            self.directory.display()
        )))
    }

    fn file_name(&self, stamp: i64, attempt: u32) -> String {
        if attempt == 0 {
            format!("{}_{}.{}", self.prefix, stamp, self.extension)
        } else {
            format!("{}_{}_{}.{}", self.prefix, stamp, attempt, self.extension)
        }
    }
}
