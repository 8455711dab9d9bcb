use std::cmp::Ordering;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// Bytes sniffed from the head of a file for format and quality probing.
/// Quantization tables sit in the first few segments of a JPEG, well inside
/// this window.
const PROBE_LEN: usize = 64 * 1024;

/// Base luminance quantization table from Annex K of the JPEG standard,
/// in zig-zag order as it appears in DQT segments.
#[rustfmt::skip]
const STD_LUMA_QTABLE: [u16; 64] = [
    16, 11, 12, 14, 12, 10, 16, 14,
    13, 14, 18, 17, 16, 19, 24, 40,
    26, 24, 22, 22, 24, 49, 35, 37,
    29, 40, 58, 51, 61, 60, 57, 51,
    56, 55, 64, 72, 92, 78, 64, 68,
    87, 69, 55, 56, 80, 109, 81, 87,
    95, 98, 103, 104, 103, 62, 77, 113,
    121, 112, 100, 120, 92, 101, 103, 99,
];

/// Comparable quality descriptor for one image file.
///
/// Ordering contract: a lossless encoding beats a lossy one; two files in the
/// same format compare by numeric score. Files in different lossy formats are
/// incomparable ([`ImageQuality::compare`] returns `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageQuality {
    pub format: String,
    pub lossless: bool,
    pub score: u32,
}

impl ImageQuality {
    pub fn new(format: impl Into<String>, lossless: bool, score: u32) -> Self {
        Self {
            format: format.into(),
            lossless,
            score,
        }
    }

    /// Probe the file head for format and encoding quality.
    ///
    /// Returns `None` for formats without a quality ranking (tiff, bmp, ...)
    /// and for files that cannot be read or recognized.
    pub fn probe(path: &Path) -> Option<ImageQuality> {
        let mut head = vec![0u8; PROBE_LEN];
        let mut file = File::open(path).ok()?;
        let mut read = 0;
        while read < head.len() {
            match file.read(&mut head[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(_) => return None,
            }
        }
        head.truncate(read);
        Self::from_bytes(&head)
    }

    fn from_bytes(head: &[u8]) -> Option<ImageQuality> {
        match image::guess_format(head).ok()? {
            ImageFormat::Png => Some(ImageQuality::new("png", true, 100)),
            ImageFormat::Jpeg => Some(ImageQuality::new(
                "jpeg",
                false,
                jpeg_quality(head).unwrap_or(0),
            )),
            ImageFormat::WebP => Some(ImageQuality::new("webp", webp_is_lossless(head), 0)),
            _ => None,
        }
    }

    fn beats(&self, other: &ImageQuality) -> bool {
        self.lossless && !other.lossless
            || self.format == other.format && self.score > other.score
    }

    fn ties(&self, other: &ImageQuality) -> bool {
        self.lossless && other.lossless
            || self.format == other.format && self.score == other.score
    }

    /// Partial order over encodings. Two lossless encodings tie even across
    /// formats; two lossy encodings in different formats are incomparable.
    /// Not a `PartialOrd` impl: the tie rule is coarser than `PartialEq`.
    pub fn compare(&self, other: &ImageQuality) -> Option<Ordering> {
        if self.ties(other) {
            Some(Ordering::Equal)
        } else if self.beats(other) {
            Some(Ordering::Greater)
        } else if other.beats(self) {
            Some(Ordering::Less)
        } else {
            None
        }
    }
}

/// Estimate the encoder quality setting of a JPEG from its first luminance
/// quantization table, inverting the libjpeg scaling formula.
fn jpeg_quality(bytes: &[u8]) -> Option<u32> {
    let table = find_luma_qtable(bytes)?;

    // Mean scaling percentage of the table relative to the base table.
    let scale: u64 = table
        .iter()
        .zip(STD_LUMA_QTABLE.iter())
        .map(|(&q, &base)| q as u64 * 100 / base as u64)
        .sum::<u64>()
        / 64;

    // libjpeg: scale = 200 - 2q for q >= 50, scale = 5000 / q below.
    let quality = if scale == 0 {
        100
    } else if scale <= 100 {
        (200 - scale) / 2
    } else {
        5000 / scale
    };
    Some(quality.min(100) as u32)
}

/// Walk JPEG segments looking for the first DQT table with id 0.
fn find_luma_qtable(bytes: &[u8]) -> Option<[u16; 64]> {
    if bytes.len() < 4 || bytes[0] != 0xff || bytes[1] != 0xd8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xff {
            return None;
        }
        let marker = bytes[i + 1];
        match marker {
            // Fill bytes before a marker.
            0xff => {
                i += 1;
                continue;
            }
            // Standalone markers carry no length field.
            0xd0..=0xd9 | 0x01 => {
                i += 2;
                continue;
            }
            // Start of scan: entropy-coded data follows, tables are behind us.
            0xda => return None,
            _ => {}
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        if len < 2 || i + 2 + len > bytes.len() {
            return None;
        }
        if marker == 0xdb {
            let mut data = &bytes[i + 4..i + 2 + len];
            while !data.is_empty() {
                let precision = data[0] >> 4;
                let table_id = data[0] & 0x0f;
                let entry_len = if precision == 0 { 1 } else { 2 };
                if data.len() < 1 + 64 * entry_len {
                    break;
                }
                if table_id == 0 {
                    let mut table = [0u16; 64];
                    for (k, slot) in table.iter_mut().enumerate() {
                        *slot = if precision == 0 {
                            data[1 + k] as u16
                        } else {
                            u16::from_be_bytes([data[1 + 2 * k], data[2 + 2 * k]])
                        };
                    }
                    return Some(table);
                }
                data = &data[1 + 64 * entry_len..];
            }
        }
        i += 2 + len;
    }
    None
}

/// A WebP file is lossless when it carries a VP8L bitstream, either directly
/// or as a chunk inside an extended (VP8X) container.
fn webp_is_lossless(bytes: &[u8]) -> bool {
    if bytes.len() < 16 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return false;
    }
    if &bytes[12..16] == b"VP8L" {
        return true;
    }
    if &bytes[12..16] == b"VP8X" {
        // Chunk scan over the extended container.
        let mut i = 12;
        while i + 8 <= bytes.len() {
            if &bytes[i..i + 4] == b"VP8L" {
                return true;
            }
            let chunk_len =
                u32::from_le_bytes([bytes[i + 4], bytes[i + 5], bytes[i + 6], bytes[i + 7]])
                    as usize;
            // Chunks are padded to even length.
            i += 8 + chunk_len + (chunk_len & 1);
        }
    }
    false
}
