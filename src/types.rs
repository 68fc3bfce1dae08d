//! Core types used throughout the engine.
//!
//! This module defines the fundamental data structures for foreground
//! tracking, screen capture, text extraction, and scan results.

use serde::{Deserialize, Serialize};

/// Package/bundle identifier of an application
pub type AppId = String;

/// A foreground-app change observed by the monitor
#[derive(Debug, Clone)]
pub struct ForegroundAppEvent {
    /// Package id of the app that came to the foreground
    pub app_id: AppId,
    /// When the change was observed
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ForegroundAppEvent {
    pub fn now(app_id: impl Into<AppId>) -> Self {
        Self {
            app_id: app_id.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Visibility state of the floating bubble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleState {
    Hidden,
    Visible,
}

impl BubbleState {
    pub fn is_visible(&self) -> bool {
        matches!(self, BubbleState::Visible)
    }
}

/// One-time permission artifact authorizing a capture session.
///
/// The OS hands this out once per consent dialog. `CaptureSession::initialize`
/// takes it by value, so a token cannot be consumed twice.
#[derive(Debug)]
pub struct CaptureToken {
    /// Result code from the consent flow (must be non-negative to be valid)
    pub result_code: i32,
    /// Opaque permission payload forwarded to the projection factory
    pub permission_payload: Vec<u8>,
}

impl CaptureToken {
    pub fn new(result_code: i32, permission_payload: Vec<u8>) -> Self {
        Self {
            result_code,
            permission_payload,
        }
    }

    /// Whether the consent flow actually granted the permission
    pub fn is_granted(&self) -> bool {
        self.result_code >= 0
    }
}

/// Screen-space rectangle in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Check whether two rects overlap (open intervals, matching the
    /// viewport test used by extraction)
    pub fn intersects(&self, other: &Rect) -> bool {
        self.top < other.bottom
            && self.bottom > other.top
            && self.left < other.right
            && self.right > other.left
    }
}

/// A piece of visible text with its on-screen position
#[derive(Debug, Clone)]
pub struct TextItem {
    /// Trimmed text content
    pub text: String,
    /// Bounding box in screen coordinates
    pub bounds: Rect,
    /// Simple element kind (e.g. "TextView"), without package prefix
    pub element_kind: String,
}

/// A user-triggered scan request handed to the analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    /// When the user triggered the scan
    pub triggered_at: i64,
    /// Joined screen text ("main link: <url> | ..." when a URL was found)
    pub text: String,
    /// Path to a captured frame, when a capture session was live
    pub frame_path: Option<std::path::PathBuf>,
}

/// Verdict returned by the external analyzer, consumed once by the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Whether the screen content looks safe
    pub is_safe: bool,
    /// Short classification label
    pub label: String,
    /// Supporting evidence, in analyzer order
    pub evidence: Vec<String>,
    /// Recommended actions, in analyzer order
    pub recommendation: Vec<String>,
}

/// Errors from the capture session
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no capture permission granted")]
    NoPermission,

    #[error("capture token already consumed")]
    TokenConsumed,

    #[error("projection revoked by the system")]
    ProjectionRevoked,

    #[error("session not initialized")]
    NotInitialized,

    #[error("no frame available from the frame source")]
    FrameUnavailable,

    #[error("failed to initialize capture: {0}")]
    Init(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a scan
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("accessibility tree unavailable - nothing to scan")]
    AccessibilityUnavailable,

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("analyzer failed: {0}")]
    Analyzer(String),
}

/// Errors from the foreground monitor's fallback query path
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("foreground query failed: {0}")]
    QueryFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersects() {
        let viewport = Rect::new(20, 200, 1060, 1770);
        assert!(Rect::new(0, 300, 100, 340).intersects(&viewport));
        // Entirely above the viewport (status bar area)
        assert!(!Rect::new(0, 0, 1080, 150).intersects(&viewport));
        // Touching edges do not intersect
        assert!(!Rect::new(0, 0, 1080, 200).intersects(&viewport));
    }

    #[test]
    fn test_rect_dimensions() {
        let r = Rect::new(10, 20, 110, 220);
        assert_eq!(r.width(), 100);
        assert_eq!(r.height(), 200);
    }

    #[test]
    fn test_token_granted() {
        assert!(CaptureToken::new(0, vec![1, 2]).is_granted());
        assert!(!CaptureToken::new(-1, vec![]).is_granted());
    }

    #[test]
    fn test_scan_result_roundtrip_preserves_order_and_empty_lists() {
        let result = ScanResult {
            is_safe: false,
            label: "phishing".to_string(),
            evidence: vec!["x".to_string(), "y".to_string()],
            recommendation: vec![],
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: ScanResult = serde_json::from_str(&json).unwrap();

        assert_eq!(back, result);
        assert_eq!(back.evidence, vec!["x", "y"]);
        assert!(back.recommendation.is_empty());
    }
}
