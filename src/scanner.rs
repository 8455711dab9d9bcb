use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{ConfigError, ScanConfig};
use crate::core::grouping::{GroupingEngine, ImageGroup};
use crate::core::hash::PerceptualHasher;
use crate::core::record::ImageRecord;
use crate::discovery;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("A scan is already running")]
    AlreadyScanning,

    #[error("Scan worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Incremental scan notifications.
///
/// `ImageFound` and `LoadFailed` arrive once per candidate file, in no
/// particular order. `ResultsReady` arrives exactly once per completed run
/// and never after a cancellation.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    ImageFound { path: PathBuf },
    LoadFailed { path: PathBuf, reason: String },
    ResultsReady { groups: Vec<ImageGroup> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Completed,
    Cancelled,
}

/// Terminal result of a scan run. A cancelled run delivers no groups;
/// partially formed groups are discarded, not flushed.
#[derive(Debug)]
pub enum ScanOutcome {
    Completed(Vec<ImageGroup>),
    Cancelled,
}

/// Drives discovery, hashing and grouping off the interactive thread.
///
/// Discovery streams into a rayon worker pool; each worker hashes one file
/// at a time and inserts into the shared [`GroupingEngine`] behind a mutex,
/// so group merges are atomic and no reader observes a partial partition.
/// Cancellation is checked once per file: in-flight hashes finish, nothing
/// new starts.
pub struct ScannerService {
    event_sender: Option<mpsc::UnboundedSender<ScanEvent>>,
    cancellation_token: Arc<AtomicBool>,
    state: Arc<Mutex<ScanState>>,
}

impl ScannerService {
    pub fn new() -> Self {
        Self {
            event_sender: None,
            cancellation_token: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(ScanState::Idle)),
        }
    }

    pub fn with_event_sender(mut self, sender: mpsc::UnboundedSender<ScanEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock().expect("scanner state lock poisoned")
    }

    pub fn get_cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation_token.clone()
    }

    /// Request early termination. No new file begins hashing once the flag
    /// is observed; the run ends without a `ResultsReady` event.
    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Run a full scan: walk the configured roots, hash every image file,
    /// group by similarity, and emit events along the way.
    ///
    /// Per-file failures surface as `LoadFailed` events and never abort the
    /// scan; the only pre-flight error is an empty root set.
    pub async fn scan(&self, config: &ScanConfig) -> Result<ScanOutcome, ScanError> {
        config.validate()?;

        {
            let mut state = self.state.lock().expect("scanner state lock poisoned");
            if *state == ScanState::Scanning {
                return Err(ScanError::AlreadyScanning);
            }
            *state = ScanState::Scanning;
        }

        if self.cancellation_token.load(Ordering::Relaxed) {
            self.set_state(ScanState::Cancelled);
            return Ok(ScanOutcome::Cancelled);
        }

        let config = config.clone();
        let sender = self.event_sender.clone();
        let cancellation_token = self.cancellation_token.clone();

        let joined = tokio::task::spawn_blocking(move || {
            run_scan(&config, sender.as_ref(), &cancellation_token)
        })
        .await;
        self.complete_scan(joined)
    }

    /// Settle the terminal state from the worker's join result. A panicked
    /// worker must not leave the service stuck in `Scanning`.
    fn complete_scan(
        &self,
        joined: Result<Option<Vec<ImageGroup>>, tokio::task::JoinError>,
    ) -> Result<ScanOutcome, ScanError> {
        match joined {
            Ok(Some(groups)) => {
                self.send_event(ScanEvent::ResultsReady {
                    groups: groups.clone(),
                });
                self.set_state(ScanState::Completed);
                Ok(ScanOutcome::Completed(groups))
            }
            Ok(None) => {
                self.set_state(ScanState::Cancelled);
                Ok(ScanOutcome::Cancelled)
            }
            Err(e) => {
                self.set_state(ScanState::Idle);
                Err(ScanError::Worker(e))
            }
        }
    }

    fn set_state(&self, state: ScanState) {
        *self.state.lock().expect("scanner state lock poisoned") = state;
    }

    fn send_event(&self, event: ScanEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }
}

impl Default for ScannerService {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocking scan body. Returns the final groups, or `None` when cancelled.
fn run_scan(
    config: &ScanConfig,
    sender: Option<&mpsc::UnboundedSender<ScanEvent>>,
    cancellation_token: &AtomicBool,
) -> Option<Vec<ImageGroup>> {
    let engine = Mutex::new(GroupingEngine::new(config.threshold));
    let hasher = PerceptualHasher::new();
    let found = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    discovery::discover_files(&config.roots, config.recursive)
        .par_bridge()
        .for_each(|path| {
            if cancellation_token.load(Ordering::Relaxed) {
                return;
            }
            // Non-image files are not candidates; skip without an event. An
            // unreadable file is a failure, not a skip.
            match discovery::is_image_file(&path) {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    log::warn!("Could not read {}: {}", path.display(), e);
                    failed.fetch_add(1, Ordering::Relaxed);
                    if let Some(sender) = sender {
                        let _ = sender.send(ScanEvent::LoadFailed {
                            path,
                            reason: e.to_string(),
                        });
                    }
                    return;
                }
            }
            match hasher.hash_path(&path) {
                Ok(hash) => {
                    engine
                        .lock()
                        .expect("grouping engine lock poisoned")
                        .insert(ImageRecord::new(path.clone(), hash));
                    found.fetch_add(1, Ordering::Relaxed);
                    if let Some(sender) = sender {
                        let _ = sender.send(ScanEvent::ImageFound { path });
                    }
                }
                Err(e) => {
                    log::warn!("Could not load {}: {}", path.display(), e);
                    failed.fetch_add(1, Ordering::Relaxed);
                    if let Some(sender) = sender {
                        let _ = sender.send(ScanEvent::LoadFailed {
                            path,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        });

    if cancellation_token.load(Ordering::Relaxed) {
        log::info!("Scan cancelled, partial results discarded");
        return None;
    }

    let groups = engine
        .into_inner()
        .expect("grouping engine lock poisoned")
        .finalize();
    log::info!(
        "Scan complete: {} images hashed, {} failed, {} groups",
        found.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        groups.len()
    );
    Some(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn gradient_image() -> DynamicImage {
        let img = ImageBuffer::from_fn(64, 64, |x, y| {
            let intensity = ((x + y) % 256) as u8;
            Rgb([intensity, intensity, intensity])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn checkerboard_image() -> DynamicImage {
        let img = ImageBuffer::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([255u8, 255, 255])
            } else {
                Rgb([0u8, 0, 0])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    /// Starts like a PNG but is not decodable: passes the content probe,
    /// fails the hash.
    fn create_corrupt_png(path: &Path) {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef].repeat(16));
        fs::write(path, bytes).unwrap();
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn count_found(events: &[ScanEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ScanEvent::ImageFound { .. }))
            .count()
    }

    fn count_failed(events: &[ScanEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ScanEvent::LoadFailed { .. }))
            .count()
    }

    fn results_ready(events: &[ScanEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ScanEvent::ResultsReady { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_scan_rejects_empty_roots() {
        let scanner = ScannerService::new();
        let config = ScanConfig::new(Vec::new());
        let result = scanner.scan(&config).await;
        assert!(matches!(
            result,
            Err(ScanError::Config(ConfigError::NoRoots))
        ));
        assert_eq!(scanner.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_scan_groups_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        gradient_image()
            .save(temp_dir.path().join("copy_one.png"))
            .unwrap();
        gradient_image()
            .save(temp_dir.path().join("copy_two.png"))
            .unwrap();
        checkerboard_image()
            .save(temp_dir.path().join("different.png"))
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner = ScannerService::new().with_event_sender(tx);
        let config = ScanConfig::new(vec![temp_dir.path().to_path_buf()]);

        let outcome = scanner.scan(&config).await.unwrap();
        let groups = match outcome {
            ScanOutcome::Completed(groups) => groups,
            ScanOutcome::Cancelled => panic!("scan was not cancelled"),
        };

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert!(groups[0].contains(&temp_dir.path().join("copy_one.png")));
        assert!(groups[0].contains(&temp_dir.path().join("copy_two.png")));
        assert_eq!(scanner.state(), ScanState::Completed);

        let events = drain(&mut rx);
        assert_eq!(count_found(&events), 3);
        assert_eq!(count_failed(&events), 0);
        assert_eq!(results_ready(&events), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_does_not_abort_scan() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..9 {
            gradient_image()
                .save(temp_dir.path().join(format!("valid_{i}.png")))
                .unwrap();
        }
        create_corrupt_png(&temp_dir.path().join("broken.png"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner = ScannerService::new().with_event_sender(tx);
        let config = ScanConfig::new(vec![temp_dir.path().to_path_buf()]);

        let outcome = scanner.scan(&config).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Completed(_)));

        let events = drain(&mut rx);
        assert_eq!(count_found(&events), 9);
        assert_eq!(count_failed(&events), 1);
        assert_eq!(results_ready(&events), 1);

        let failed_path = events.iter().find_map(|e| match e {
            ScanEvent::LoadFailed { path, .. } => Some(path.clone()),
            _ => None,
        });
        assert_eq!(failed_path, Some(temp_dir.path().join("broken.png")));
    }

    #[tokio::test]
    async fn test_non_image_files_skipped_silently() {
        let temp_dir = TempDir::new().unwrap();
        gradient_image()
            .save(temp_dir.path().join("image.png"))
            .unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"not an image").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner = ScannerService::new().with_event_sender(tx);
        let config = ScanConfig::new(vec![temp_dir.path().to_path_buf()]);

        scanner.scan(&config).await.unwrap();
        let events = drain(&mut rx);
        assert_eq!(count_found(&events), 1);
        assert_eq!(count_failed(&events), 0);
    }

    #[tokio::test]
    async fn test_image_detected_by_content_not_extension() {
        let temp_dir = TempDir::new().unwrap();
        gradient_image()
            .save_with_format(
                temp_dir.path().join("disguised.dat"),
                image::ImageFormat::Png,
            )
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner = ScannerService::new().with_event_sender(tx);
        let config = ScanConfig::new(vec![temp_dir.path().to_path_buf()]);

        scanner.scan(&config).await.unwrap();
        assert_eq!(count_found(&drain(&mut rx)), 1);
    }

    #[tokio::test]
    async fn test_non_recursive_scan() {
        let temp_dir = TempDir::new().unwrap();
        let sub = temp_dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        gradient_image()
            .save(temp_dir.path().join("top.png"))
            .unwrap();
        gradient_image().save(sub.join("nested.png")).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner = ScannerService::new().with_event_sender(tx);
        let config =
            ScanConfig::new(vec![temp_dir.path().to_path_buf()]).with_recursive(false);

        scanner.scan(&config).await.unwrap();
        assert_eq!(count_found(&drain(&mut rx)), 1);
    }

    #[tokio::test]
    async fn test_cancelled_scan_delivers_no_results() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..20 {
            gradient_image()
                .save(temp_dir.path().join(format!("img_{i}.png")))
                .unwrap();
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner = ScannerService::new().with_event_sender(tx);
        scanner.cancel();

        let config = ScanConfig::new(vec![temp_dir.path().to_path_buf()]);
        let outcome = scanner.scan(&config).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Cancelled));
        assert_eq!(scanner.state(), ScanState::Cancelled);

        let events = drain(&mut rx);
        assert_eq!(results_ready(&events), 0);
    }

    #[tokio::test]
    async fn test_cancellation_mid_scan_via_token() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..30 {
            gradient_image()
                .save(temp_dir.path().join(format!("img_{i}.png")))
                .unwrap();
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner = ScannerService::new().with_event_sender(tx);
        let token = scanner.get_cancellation_token();

        // Flip the flag as soon as the first event shows up.
        let config = ScanConfig::new(vec![temp_dir.path().to_path_buf()]);
        let scan = scanner.scan(&config);
        let canceller = async {
            while rx.recv().await.is_some() {
                token.store(true, Ordering::Relaxed);
                break;
            }
        };
        let (outcome, _) = tokio::join!(scan, canceller);

        // Workers may drain the stream before the flag lands; either way a
        // cancelled run must not produce ResultsReady.
        if matches!(outcome.unwrap(), ScanOutcome::Cancelled) {
            assert_eq!(results_ready(&drain(&mut rx)), 0);
            assert_eq!(scanner.state(), ScanState::Cancelled);
        }
    }

    #[tokio::test]
    async fn test_worker_failure_resets_state() {
        let scanner = ScannerService::new();
        *scanner.state.lock().unwrap() = ScanState::Scanning;

        // Manufacture a real JoinError from a panicked task.
        let join_err = tokio::spawn(async {
            panic!("worker died");
        })
        .await
        .unwrap_err();

        let result = scanner.complete_scan(Err(join_err));
        assert!(matches!(result, Err(ScanError::Worker(_))));
        assert_eq!(scanner.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_state_starts_idle() {
        let scanner = ScannerService::new();
        assert_eq!(scanner.state(), ScanState::Idle);
    }
}
