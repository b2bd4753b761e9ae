//! Image acquisition and optional cropping, applied before the pipeline runs.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;

/// Failure to obtain a decoded image.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("image file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: image::ImageError,
    },

    #[error("image from {origin} is empty")]
    Empty { origin: String },
}

/// Anything that can hand the pipeline one decoded image.
pub trait ImageSource {
    /// Short human-readable description (path, camera name).
    fn describe(&self) -> String;

    /// Produce a complete image or fail; callers decide about retries.
    fn acquire(&self) -> Result<DynamicImage, AcquisitionError>;
}

/// Image stored on disk.
#[derive(Debug, Clone)]
pub struct FileImageSource {
    path: PathBuf,
}

impl FileImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileImageSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn acquire(&self) -> Result<DynamicImage, AcquisitionError> {
        let reader = image::ImageReader::open(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AcquisitionError::NotFound {
                    path: self.path.clone(),
                }
            } else {
                AcquisitionError::Io {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;
        let reader = reader
            .with_guessed_format()
            .map_err(|e| AcquisitionError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        let img = reader.decode().map_err(|e| AcquisitionError::Decode {
            origin: self.describe(),
            source: e,
        })?;
        non_empty(img, || self.describe())
    }
}

/// Encoded image bytes already in memory, e.g. a camera snapshot.
#[derive(Debug, Clone)]
pub struct MemoryImageSource {
    name: String,
    bytes: Vec<u8>,
}

impl MemoryImageSource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl ImageSource for MemoryImageSource {
    fn describe(&self) -> String {
        format!("{} ({} bytes)", self.name, self.bytes.len())
    }

    fn acquire(&self) -> Result<DynamicImage, AcquisitionError> {
        let img = image::load_from_memory(&self.bytes).map_err(|e| AcquisitionError::Decode {
            origin: self.name.clone(),
            source: e,
        })?;
        non_empty(img, || self.name.clone())
    }
}

fn non_empty(
    img: DynamicImage,
    origin: impl FnOnce() -> String,
) -> Result<DynamicImage, AcquisitionError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(AcquisitionError::Empty { origin: origin() });
    }
    Ok(img)
}

/// Rectangle in pixel coordinates of the acquired image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CropError {
    #[error("crop rectangle {rect:?} is empty")]
    Empty { rect: CropRect },

    #[error("crop rectangle {rect:?} exceeds {image_width}x{image_height} image")]
    OutOfBounds {
        rect: CropRect,
        image_width: u32,
        image_height: u32,
    },
}

impl CropRect {
    /// Parse `"x,y,width,height"`.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<_>>()?;
        match parts.as_slice() {
            &[x, y, width, height] => Some(Self {
                x,
                y,
                width,
                height,
            }),
            _ => None,
        }
    }
}

/// Cut `rect` out of `image`; the rectangle must lie fully inside it.
pub fn crop(image: &DynamicImage, rect: CropRect) -> Result<DynamicImage, CropError> {
    if rect.width == 0 || rect.height == 0 {
        return Err(CropError::Empty { rect });
    }
    let (w, h) = (image.width(), image.height());
    let fits_x = rect.x.checked_add(rect.width).is_some_and(|r| r <= w);
    let fits_y = rect.y.checked_add(rect.height).is_some_and(|b| b <= h);
    if !(fits_x && fits_y) {
        return Err(CropError::OutOfBounds {
            rect,
            image_width: w,
            image_height: h,
        });
    }
    Ok(image.crop_imm(rect.x, rect.y, rect.width, rect.height))
}
