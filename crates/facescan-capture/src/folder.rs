//! Image files and folders as frame sources.

use facescan_core::{FrameSource, PixelBuffer};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions picked up from a folder, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::NotADirectory(dir.to_path_buf()));
    }
    let io_err = |source| SourceError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();

    tracing::debug!(dir = %dir.display(), count = images.len(), "listed images");
    Ok(images)
}

/// Decode an image file. Grayscale files stay single-channel; everything else becomes RGB.
pub fn load_image(path: &Path) -> Result<PixelBuffer, SourceError> {
    load_image_within(path, None)
}

/// [`load_image`], shrunk to at most `max_width` columns when given.
pub fn load_image_within(path: &Path, max_width: Option<u32>) -> Result<PixelBuffer, SourceError> {
    let image = image::open(path).map_err(|source| match source {
        image::ImageError::IoError(source) => SourceError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => SourceError::Decode {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let image = match max_width {
        Some(max_width) => shrink_to_width(image, max_width),
        None => image,
    };
    Ok(PixelBuffer::from_image(image))
}

/// Scale `image` down to `max_width` columns keeping its aspect ratio.
/// Images already narrow enough are returned untouched.
pub fn shrink_to_width(image: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if max_width == 0 || width <= max_width {
        return image;
    }
    let new_height = ((height as f64 * max_width as f64 / width as f64).round() as u32).max(1);
    tracing::debug!(from = ?(width, height), to = ?(max_width, new_height), "shrinking image");
    image.resize_exact(max_width, new_height, FilterType::Triangle)
}

/// Yields one frame per path, in order. Unreadable files yield an error and
/// the source moves on.
pub struct FolderSource {
    paths: std::vec::IntoIter<PathBuf>,
    max_width: Option<u32>,
}

impl FolderSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
            max_width: None,
        }
    }

    /// Shrink wider images to `max_width` columns as they are loaded.
    pub fn with_max_width(mut self, max_width: Option<u32>) -> Self {
        self.max_width = max_width;
        self
    }

    /// Source over every image in `dir`.
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        Ok(Self::new(list_images(dir)?))
    }
}

impl FrameSource for FolderSource {
    type Error = SourceError;

    fn next_frame(&mut self) -> Option<Result<PixelBuffer, SourceError>> {
        let path = self.paths.next()?;
        Some(load_image_within(&path, self.max_width))
    }
}
