//! Optional local image persistence.

use crate::error::CamResult;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};

/// Writes one JPEG per capture into a directory, named by capture time.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    dir: PathBuf,
}

impl ImageStorage {
    /// Storage rooted at `dir`. The directory is created on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `jpeg` as `<sanitized timestamp>.jpg` and return the path.
    pub fn store(&self, jpeg: &[u8], now: DateTime<Utc>) -> CamResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let stamp = sanitize_timestamp(&now.to_rfc3339_opts(SecondsFormat::Micros, false));
        let path = self.dir.join(format!("{stamp}.jpg"));
        std::fs::write(&path, jpeg)?;
        Ok(path)
    }

    /// The directory captures are written into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Make an RFC 3339 timestamp filesystem-safe: colons, periods and the
/// timezone offset sign become underscores.
pub fn sanitize_timestamp(timestamp: &str) -> String {
    timestamp.replace([':', '.', '+'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_sanitized() {
        assert_eq!(
            sanitize_timestamp("2024-05-01T12:30:45.123456+00:00"),
            "2024-05-01T12_30_45_123456_00_00"
        );
    }

    #[test]
    fn store_writes_one_file_per_capture() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ImageStorage::new(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap();
        let path = storage.store(b"\xff\xd8jpeg", now).unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("2024-05-01T12_30_45"));
        assert!(name.ends_with(".jpg"));
        assert!(!name.contains(':'));
        assert!(!name.contains('+'));
    }
}
