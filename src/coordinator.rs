//! Top-level scan orchestration.
//!
//! A bubble tap becomes `trigger_scan`: take the scan lock (or silently
//! drop the trigger if one is in flight), extract screen text, capture a
//! frame when a session is live, hand everything to the analyzer, and
//! deliver the verdict to the UI layer. The lock guard is dropped on every
//! exit path, so a failed scan can never wedge future scans.

use crate::analyzer::ScanAnalyzer;
use crate::capture::{CaptureSession, ProjectionFactory};
use crate::extractor::{ElementTreeSource, TextExtractor};
use crate::types::{CaptureError, CaptureToken, ScanError, ScanRequest, ScanResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// UI collaborator that consumes scan outcomes
pub trait ScanResultSink: Send + Sync {
    fn deliver(&self, result: ScanResult);

    /// Resource-unavailable and analyzer failures, so the UI can prompt
    /// for permission/setup instead of showing a verdict
    fn deliver_error(&self, error: ScanError);
}

/// Resources a scan holds exclusively while in flight
struct ScanResources {
    capture: CaptureSession,
}

/// Single-flight scan orchestrator
pub struct ScanCoordinator {
    /// Scan lock; `try_lock` makes a second trigger a no-op, not a queue
    resources: Mutex<ScanResources>,
    extractor: TextExtractor,
    tree: Arc<dyn ElementTreeSource>,
    analyzer: Arc<dyn ScanAnalyzer>,
    sink: Arc<dyn ScanResultSink>,
    scans_started: AtomicU64,
}

impl ScanCoordinator {
    pub fn new(
        capture: CaptureSession,
        extractor: TextExtractor,
        tree: Arc<dyn ElementTreeSource>,
        analyzer: Arc<dyn ScanAnalyzer>,
        sink: Arc<dyn ScanResultSink>,
    ) -> Self {
        Self {
            resources: Mutex::new(ScanResources { capture }),
            extractor,
            tree,
            analyzer,
            sink,
            scans_started: AtomicU64::new(0),
        }
    }

    /// Consume a capture token into the session. Serialized against any
    /// in-flight scan by the same lock.
    pub async fn initialize_capture(
        &self,
        factory: &dyn ProjectionFactory,
        token: CaptureToken,
    ) -> Result<(), CaptureError> {
        self.resources.lock().await.capture.initialize(factory, token)
    }

    /// Tear down the capture session (service stop, explicit user request)
    pub async fn release_capture(&self) {
        self.resources.lock().await.capture.release();
    }

    /// Run one scan. Returns `false` when a scan was already in flight
    /// (rapid repeated taps are dropped, not queued).
    pub async fn trigger_scan(&self) -> bool {
        let mut guard = match self.resources.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("⚠️ Already scanning, ignoring trigger");
                return false;
            }
        };

        self.scans_started.fetch_add(1, Ordering::SeqCst);
        info!("🔒 Scan started");

        match self.run_scan(&mut guard.capture).await {
            Ok(result) => {
                info!("📊 Scan verdict: safe={} label={}", result.is_safe, result.label);
                self.sink.deliver(result);
            }
            Err(e) => {
                warn!("Scan failed: {}", e);
                self.sink.deliver_error(e);
            }
        }

        info!("🔓 Scan completed, lock released");
        // guard drops here on every path
        true
    }

    async fn run_scan(&self, capture: &mut CaptureSession) -> Result<ScanResult, ScanError> {
        let text = self.extractor.scan_joined(self.tree.as_ref());

        // A capture failure degrades to a text-only scan; the session has
        // already torn itself down for the next grant.
        let frame_path = if capture.is_initialized() {
            match capture.capture_frame().await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Frame capture failed, continuing with text only: {}", e);
                    None
                }
            }
        } else {
            None
        };

        if text.is_empty() && frame_path.is_none() {
            return Err(ScanError::AccessibilityUnavailable);
        }

        let request = ScanRequest {
            triggered_at: chrono::Utc::now().timestamp_millis(),
            text,
            frame_path,
        };

        self.analyzer.analyze(request).await
    }

    /// Number of scans that actually acquired the lock
    pub fn scans_started(&self) -> u64 {
        self.scans_started.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::extractor::test_support::{FakeNode, FakeTree};
    use crate::types::Rect;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct SlowAnalyzer {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl ScanAnalyzer for SlowAnalyzer {
        async fn analyze(&self, _request: ScanRequest) -> Result<ScanResult, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(ScanResult {
                is_safe: true,
                label: "clean".to_string(),
                evidence: vec![],
                recommendation: vec![],
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        results: StdMutex<Vec<ScanResult>>,
        errors: AtomicUsize,
    }

    impl ScanResultSink for RecordingSink {
        fn deliver(&self, result: ScanResult) {
            self.results.lock().unwrap().push(result);
        }

        fn deliver_error(&self, _error: ScanError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn content_tree() -> Arc<FakeTree> {
        Arc::new(FakeTree::new(FakeNode::container(vec![FakeNode::text(
            "verify your account now",
            "TextView",
            Rect::new(40, 300, 600, 360),
        )])))
    }

    fn coordinator(
        tree: Arc<FakeTree>,
        analyzer: Arc<SlowAnalyzer>,
        sink: Arc<RecordingSink>,
    ) -> ScanCoordinator {
        let dir = std::env::temp_dir().join("screenguard-test-captures");
        ScanCoordinator::new(
            CaptureSession::new(dir, Duration::from_millis(5)),
            TextExtractor::new(&ExtractionConfig::default()),
            tree,
            analyzer,
            sink,
        )
    }

    #[tokio::test]
    async fn test_scan_delivers_result() {
        let analyzer = Arc::new(SlowAnalyzer {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator(content_tree(), analyzer.clone(), sink.clone());

        assert!(coordinator.trigger_scan().await);
        assert_eq!(sink.results.lock().unwrap().len(), 1);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_single_flight() {
        let analyzer = Arc::new(SlowAnalyzer {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(100),
        });
        let sink = Arc::new(RecordingSink::default());
        let coordinator = Arc::new(coordinator(content_tree(), analyzer.clone(), sink.clone()));

        let (a, b) = tokio::join!(coordinator.trigger_scan(), coordinator.trigger_scan());

        // Exactly one trigger won the lock; the other was a silent no-op
        assert!(a ^ b);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.scans_started(), 1);

        // The lock was released, so the next trigger scans again
        assert!(coordinator.trigger_scan().await);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_screen_surfaces_unavailable() {
        let analyzer = Arc::new(SlowAnalyzer {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let sink = Arc::new(RecordingSink::default());
        let tree = Arc::new(FakeTree::empty());
        let coordinator = coordinator(tree, analyzer.clone(), sink.clone());

        assert!(coordinator.trigger_scan().await);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.errors.load(Ordering::SeqCst), 1);

        // A failed scan never wedges the next one
        assert!(coordinator.trigger_scan().await);
        assert_eq!(sink.errors.load(Ordering::SeqCst), 2);
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl ScanAnalyzer for FailingAnalyzer {
        async fn analyze(&self, _request: ScanRequest) -> Result<ScanResult, ScanError> {
            Err(ScanError::Analyzer("service crashed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_analyzer_failure_releases_lock() {
        let sink = Arc::new(RecordingSink::default());
        let dir = std::env::temp_dir().join("screenguard-test-captures");
        let coordinator = ScanCoordinator::new(
            CaptureSession::new(dir, Duration::from_millis(5)),
            TextExtractor::new(&ExtractionConfig::default()),
            content_tree(),
            Arc::new(FailingAnalyzer),
            sink.clone(),
        );

        assert!(coordinator.trigger_scan().await);
        assert_eq!(sink.errors.load(Ordering::SeqCst), 1);
        assert!(coordinator.trigger_scan().await);
        assert_eq!(coordinator.scans_started(), 2);
    }
}
