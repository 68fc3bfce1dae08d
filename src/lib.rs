//! Screenguard - foreground observation and capture orchestration
//!
//! This crate watches which application is in the foreground on a device,
//! decides when to show a floating control ("bubble") over protected apps,
//! and on user request captures the screen and extracts its visible text
//! for downstream scam-detection analysis:
//!
//! - **AppSwitchMonitor**: de-duplicated foreground-app stream (event-driven
//!   primary path plus a periodic-poll fallback)
//! - **BubbleVisibilityController**: debounced visibility state machine
//! - **CaptureSession**: single reusable capture context built from a
//!   one-time permission token
//! - **TextExtractor**: ordered, filtered text from the accessibility tree
//! - **ScanCoordinator**: single-flight scan orchestration
//!
//! Overlay rendering, permission dialogs, persistence, and the scam
//! classification itself are external collaborators reached through the
//! traits at each module's seam.

pub mod analyzer;
pub mod capture;
pub mod config;
pub mod coordinator;
pub mod extractor;
pub mod monitor;
pub mod protected;
pub mod types;
pub mod visibility;

// Re-export commonly used types
pub use analyzer::{AnalyzerJob, ChannelAnalyzer, ScanAnalyzer};
pub use capture::{
    CaptureSession, FrameSource, ProjectionFactory, ProjectionHandle, RawFrame, TokenSlot,
};
pub use config::Config;
pub use coordinator::{ScanCoordinator, ScanResultSink};
pub use extractor::{ElementNode, ElementTreeSource, TextExtractor};
pub use monitor::{AppSwitchMonitor, ForegroundQuery, Subscription};
pub use protected::ProtectedAppStore;
pub use types::{
    AppId, BubbleState, CaptureError, CaptureToken, ForegroundAppEvent, MonitorError, Rect,
    ScanError, ScanRequest, ScanResult, TextItem,
};
pub use visibility::{decide, BubbleUi, BubbleVisibilityController};
