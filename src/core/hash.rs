use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{DynamicImage, ImageReader};
use image_hasher::{HashAlg, HasherConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),
}

/// Fixed-length perceptual feature vector in Hamming space.
///
/// Two hashes produced by the same [`PerceptualHasher`] have equal length;
/// visually similar images yield hashes at small Hamming distance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PerceptualHash {
    bits: Box<[u8]>,
}

impl PerceptualHash {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bits: bytes.into_boxed_slice(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Number of bits in the hash.
    pub fn len(&self) -> usize {
        self.bits.len() * 8
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Hamming distance: count of differing bit positions.
    ///
    /// Hashes of unequal length never arise from a single hasher; if compared
    /// anyway, the surplus bytes all count as differing.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        let common: u32 = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        let surplus = self.bits.len().abs_diff(other.bits.len()) as u32 * 8;
        common + surplus
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.bits.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Computes DCT-based perceptual hashes for images.
///
/// The hash is deterministic for identical pixel content, independent of the
/// source path or container format.
pub struct PerceptualHasher {
    hash_width: u32,
    hash_height: u32,
}

impl PerceptualHasher {
    /// 64-bit hash, the size the default similarity threshold is tuned for.
    pub fn new() -> Self {
        Self {
            hash_width: 8,
            hash_height: 8,
        }
    }

    pub fn with_hash_size(hash_width: u32, hash_height: u32) -> Self {
        Self {
            hash_width,
            hash_height,
        }
    }

    /// Decode the file at `path` and hash its pixels.
    ///
    /// The decoder is picked from the file content, so a misleading or
    /// missing extension does not matter.
    pub fn hash_path(&self, path: &Path) -> Result<PerceptualHash, HashError> {
        let file = File::open(path)?;
        let reader = ImageReader::new(BufReader::new(file)).with_guessed_format()?;
        let image = reader.decode()?;
        Ok(self.hash_image(&image))
    }

    pub fn hash_image(&self, image: &DynamicImage) -> PerceptualHash {
        let hasher = HasherConfig::new()
            .hash_size(self.hash_width, self.hash_height)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();
        PerceptualHash::from_bytes(hasher.hash_image(image).as_bytes().to_vec())
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}
