//! Writing annotated buffers to disk.

use chrono::{DateTime, Local};
use facescan_core::{BufferError, PixelBuffer};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Timestamp layout for capture file names; milliseconds keep stream frames apart.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("cannot create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Encode `buffer` to `path`; the format follows the extension.
/// Missing parent directories are created.
pub fn save_buffer(buffer: &PixelBuffer, path: &Path) -> Result<(), SaveError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| SaveError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    buffer
        .to_dynamic_image()?
        .save(path)
        .map_err(|source| SaveError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), "saved image");
    Ok(())
}

/// `<dir>/<prefix>_<YYYYmmdd_HHMMSS_mmm>.<ext>`
pub fn timestamped_path(dir: &Path, prefix: &str, extension: &str, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("{prefix}_{}.{extension}", at.format(TIMESTAMP_FORMAT)))
}

/// Save `buffer` as a JPEG named after the current local time.
pub fn save_timestamped(buffer: &PixelBuffer, dir: &Path, prefix: &str) -> Result<PathBuf, SaveError> {
    let path = timestamped_path(dir, prefix, "jpg", Local::now());
    save_buffer(buffer, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamped_path_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        let path = timestamped_path(Path::new("captures"), "capture", "jpg", at);
        assert_eq!(path, Path::new("captures/capture_20240309_070502_000.jpg"));
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/result.png");
        let buffer = PixelBuffer::filled(5, 3, &[10, 20, 30]).unwrap();
        save_buffer(&buffer, &path).unwrap();

        let reloaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(reloaded.dimensions(), (5, 3));
        assert_eq!(reloaded.get_pixel(4, 2).0, [10, 20, 30]);
    }

    #[test]
    fn test_save_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = PixelBuffer::filled(8, 8, &[200]).unwrap();
        let path = save_timestamped(&buffer, dir.path(), "capture").unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("capture_") && name.ends_with(".jpg"), "{name}");
    }

    #[test]
    fn test_save_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = PixelBuffer::filled(2, 2, &[0]).unwrap();
        let err = save_buffer(&buffer, &dir.path().join("x.unknownext")).unwrap_err();
        assert!(matches!(err, SaveError::Encode { .. }));
    }
}
