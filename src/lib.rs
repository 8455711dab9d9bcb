//! Perceptual similarity grouping engine for duplicate-image review tools.
//!
//! The crate scans a set of root directories for image files, computes a
//! perceptual hash per image, and clusters images whose hashes fall within a
//! Hamming-distance threshold using online single-linkage clustering. A
//! presentation layer drives [`ScannerService`], receives [`ScanEvent`]s as
//! files are discovered, and renders the final [`ImageGroup`] list, using
//! [`review_group`] to mark the best and worst copy in each group.
//!
//! ```no_run
//! use picmatch::{ScanConfig, ScanEvent, ScanOutcome, ScannerService};
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), picmatch::ScanError> {
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let scanner = ScannerService::new().with_event_sender(tx);
//! let config = ScanConfig::new(vec!["/home/me/Pictures".into()]);
//!
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         if let ScanEvent::ImageFound { path } = event {
//!             println!("found {}", path.display());
//!         }
//!     }
//! });
//!
//! if let ScanOutcome::Completed(groups) = scanner.scan(&config).await? {
//!     for group in &groups {
//!         let review = picmatch::review_group(group);
//!         for member in &review.members {
//!             println!("  {} ({:?})", member.display_path, member.quality);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod discovery;
pub mod scanner;

pub use config::{ConfigError, ScanConfig, DEFAULT_THRESHOLD};
pub use core::grouping::{GroupingEngine, ImageGroup};
pub use core::hash::{HashError, PerceptualHash, PerceptualHasher};
pub use core::quality::ImageQuality;
pub use core::record::ImageRecord;
pub use core::review::{review_group, AttributeState, GroupReview, MemberReview};
pub use scanner::{ScanError, ScanEvent, ScanOutcome, ScanState, ScannerService};
