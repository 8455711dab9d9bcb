use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use image::ImageReader;

use crate::core::hash::PerceptualHash;
use crate::core::quality::ImageQuality;

/// One discovered image.
///
/// Identity is the file path: two records are equal iff their paths are
/// equal. The perceptual hash is fixed at construction; size, dimensions and
/// quality are computed on first access and memoized. Files are not expected
/// to change mid-scan, so there is no invalidation path.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    path: PathBuf,
    hash: PerceptualHash,
    file_size: OnceLock<u64>,
    dimensions: OnceLock<(u32, u32)>,
    quality: OnceLock<Option<ImageQuality>>,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>, hash: PerceptualHash) -> Self {
        Self {
            path: path.into(),
            hash,
            file_size: OnceLock::new(),
            dimensions: OnceLock::new(),
            quality: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hash(&self) -> &PerceptualHash {
        &self.hash
    }

    /// File size in bytes; 0 when the file cannot be stat-ed.
    pub fn file_size(&self) -> u64 {
        *self.file_size.get_or_init(|| match fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                log::warn!("Could not read size of {}: {}", self.path.display(), e);
                0
            }
        })
    }

    /// Pixel dimensions, read from the image header without a full decode
    /// where the format allows it; (0, 0) when unreadable. The format is
    /// sniffed from the content, not the extension.
    pub fn dimensions(&self) -> (u32, u32) {
        *self.dimensions.get_or_init(|| {
            match read_dimensions(&self.path) {
                Ok(dimensions) => dimensions,
                Err(e) => {
                    log::warn!(
                        "Could not read dimensions for {}: {}",
                        self.path.display(),
                        e
                    );
                    (0, 0)
                }
            }
        })
    }

    pub fn quality(&self) -> Option<&ImageQuality> {
        self.quality
            .get_or_init(|| ImageQuality::probe(&self.path))
            .as_ref()
    }
}

#[cfg(test)]
impl ImageRecord {
    /// Record with pre-seeded metadata, bypassing the filesystem entirely.
    pub(crate) fn with_metadata(
        path: impl Into<PathBuf>,
        dimensions: (u32, u32),
        file_size: u64,
        quality: Option<ImageQuality>,
    ) -> Self {
        let record = Self::new(path, PerceptualHash::from_bytes(vec![0u8; 8]));
        record.dimensions.set(dimensions).unwrap();
        record.file_size.set(file_size).unwrap();
        record.quality.set(quality).unwrap();
        record
    }
}

fn read_dimensions(path: &Path) -> Result<(u32, u32), image::ImageError> {
    let file = File::open(path)?;
    ImageReader::new(BufReader::new(file))
        .with_guessed_format()?
        .into_dimensions()
}

impl PartialEq for ImageRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ImageRecord {}

impl Hash for ImageRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}
