use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use image::ImageReader;
use walkdir::WalkDir;

/// Content probe: does the file start with a recognized image signature?
///
/// Deliberately ignores the file extension; the reader is handed no path
/// hint, so only the magic bytes decide. The file handle is scoped to this
/// call. A file that cannot be opened or read is an error, distinct from a
/// readable file that simply is not an image.
pub fn is_image_file(path: &Path) -> io::Result<bool> {
    let file = File::open(path)?;
    let reader = ImageReader::new(BufReader::new(file)).with_guessed_format()?;
    Ok(reader.format().is_some())
}

/// Lazily yield regular files under the configured roots.
///
/// Depth is capped at the root's direct children when `recursive` is false.
/// Symlinks are not followed; unreadable entries are logged and skipped, as
/// are roots that do not exist.
pub fn discover_files(roots: &[PathBuf], recursive: bool) -> impl Iterator<Item = PathBuf> + '_ {
    roots.iter().flat_map(move |root| {
        let mut walker = WalkDir::new(root).follow_links(false);
        if !recursive {
            walker = walker.max_depth(1);
        }
        walker.into_iter().filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(entry.into_path()),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
    })
}
