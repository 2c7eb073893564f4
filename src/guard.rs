use axum::body::Bytes;
use image::ImageFormat;
use std::{fmt, path::Path};
use tokio::{fs::File, io::AsyncReadExt};
use tracing::debug;

const MEGABYTE: u64 = 1024 * 1024; // 1 MB = 1024 * 1024 bytes
pub const MAX_IMAGE_BYTES: u64 = 10 * MEGABYTE;

/// Media types accepted from the file picker. Drops only need an `image/` prefix.
pub const PICKER_MEDIA_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/jpg", "image/bmp"];

const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Picker,
    Drop,
}

/// A user supplied file that has not been submitted yet.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateImage {
    pub name: String,
    pub data: Bytes,
    /// Declared size in bytes.
    pub size: u64,
    /// Declared media type, eg `image/png`.
    pub media_type: String,
}

impl CandidateImage {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            data,
            media_type: media_type.into(),
        }
    }

    /// Reads a file from disk and declares its media type from the extension.
    ///
    /// The size is declared from file metadata. Files over [`MAX_IMAGE_BYTES`] are not
    /// read at all: the candidate carries no data and [`admit`] rejects it on size.
    pub async fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
            .to_string();
        let media_type = declared_media_type(path);

        let size = tokio::fs::metadata(path).await?.len();
        if size > MAX_IMAGE_BYTES {
            debug!("{} is {} bytes, not reading it", path.display(), size);
            return Ok(Self {
                name,
                data: Bytes::new(),
                size,
                media_type,
            });
        }

        let mut file = File::open(path).await?;
        let mut contents = Vec::with_capacity(size as usize);
        file.read_to_end(&mut contents).await?;

        Ok(Self::new(name, contents, media_type))
    }

    pub fn size_in_kb(&self) -> f64 {
        self.size as f64 / 1024.0
    }
}

pub fn declared_media_type(path: &Path) -> String {
    match ImageFormat::from_path(path) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => UNKNOWN_MEDIA_TYPE.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    TooLarge { size: u64 },
    UnsupportedFormat { media_type: String },
    NotAnImage { media_type: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooLarge { size } => write!(
                f,
                "File is too large ({:.2}MB). Maximum size is {}MB.",
                *size as f64 / MEGABYTE as f64,
                MAX_IMAGE_BYTES / MEGABYTE
            ),
            Rejection::UnsupportedFormat { .. } => {
                write!(f, "Unsupported file format. Use PNG, JPG, or BMP.")
            }
            Rejection::NotAnImage { .. } => {
                write!(f, "Invalid file format. Upload an image (PNG, JPG, BMP).")
            }
        }
    }
}

/// Checks a candidate against the size and type rules. Size is checked first.
pub fn admit(image: &CandidateImage, origin: Origin) -> Result<(), Rejection> {
    if image.size > MAX_IMAGE_BYTES {
        return Err(Rejection::TooLarge { size: image.size });
    }

    match origin {
        Origin::Picker if !PICKER_MEDIA_TYPES.contains(&image.media_type.as_str()) => {
            Err(Rejection::UnsupportedFormat {
                media_type: image.media_type.clone(),
            })
        }
        Origin::Drop if !image.media_type.starts_with("image/") => Err(Rejection::NotAnImage {
            media_type: image.media_type.clone(),
        }),
        _ => Ok(()),
    }
}
