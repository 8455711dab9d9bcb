use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Hamming-distance bound for the 64-bit DCT hash.
pub const DEFAULT_THRESHOLD: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No root directories configured")]
    NoRoots,
}

/// Input parameters for a scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Root directories to search.
    pub roots: Vec<PathBuf>,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Two images group when their hash distance is at most this.
    pub threshold: u32,
}

impl ScanConfig {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            recursive: true,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// An empty root set is the only fatal configuration error; unreadable
    /// or vanished roots are skipped during the scan like any other entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_roots_rejected() {
        let config = ScanConfig::new(Vec::new());
        assert!(matches!(config.validate(), Err(ConfigError::NoRoots)));
    }

    #[test]
    fn test_defaults() {
        let config = ScanConfig::new(vec![PathBuf::from("/photos")]);
        assert!(config.validate().is_ok());
        assert!(config.recursive);
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
    }
}
