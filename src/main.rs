//! Screenguard - daemon entry point
//!
//! Wires the engine together and runs it until Ctrl-C. Platform
//! collaborators (foreground events, element tree, projection) are
//! injected by the embedding app; this standalone binary runs with
//! no-op platform sources and logs engine activity.

use screenguard::extractor::{ElementNode, ElementTreeSource};
use screenguard::{
    AppSwitchMonitor, BubbleUi, BubbleVisibilityController, CaptureSession, ChannelAnalyzer,
    Config, ForegroundQuery, MonitorError, ProtectedAppStore, ScanCoordinator, ScanError,
    ScanResult, ScanResultSink, TextExtractor,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Foreground query for builds without a platform backend
struct NoForegroundQuery;

impl ForegroundQuery for NoForegroundQuery {
    fn current_foreground(&self) -> Result<Option<String>, MonitorError> {
        Ok(None)
    }
}

/// Element tree source for builds without a platform backend
struct NoElementTree;

impl ElementTreeSource for NoElementTree {
    fn root(&self) -> Option<Box<dyn ElementNode>> {
        None
    }

    fn screen_size(&self) -> (i32, i32) {
        (0, 0)
    }
}

/// Bubble UI collaborator that only logs transitions
struct LoggingBubbleUi;

impl BubbleUi for LoggingBubbleUi {
    fn show_bubble(&self) {
        info!("✅ Bubble shown");
    }

    fn hide_bubble(&self) {
        info!("Bubble hidden");
    }
}

/// Result sink that only logs verdicts
struct LoggingSink;

impl ScanResultSink for LoggingSink {
    fn deliver(&self, result: ScanResult) {
        info!(
            "Scan result: safe={} label={} evidence={:?}",
            result.is_safe, result.label, result.evidence
        );
    }

    fn deliver_error(&self, error: ScanError) {
        warn!("Scan error: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone())),
        )
        .with_target(false)
        .init();

    info!("Starting screenguard engine");

    if !config.general.enabled {
        info!("Engine is disabled in configuration, exiting");
        return Ok(());
    }

    let store = ProtectedAppStore::new();
    let monitor = AppSwitchMonitor::new(&config.monitor);

    let controller = BubbleVisibilityController::spawn(
        monitor.clone(),
        &store,
        Arc::new(LoggingBubbleUi),
        &config.general,
        &config.timing,
    );

    // Every foreground change schedules a debounced visibility check
    let controller = Arc::new(controller);
    let for_events = controller.clone();
    let subscription = monitor.subscribe(move |event| {
        info!("🔄 App changed to {} → checking visibility", event.app_id);
        for_events.notify_app_changed();
    });

    // No primary event source in the standalone binary: the fallback
    // poller is the sole source
    let fallback = monitor.spawn_fallback(
        Arc::new(NoForegroundQuery),
        config.timing.clone(),
        false,
    );

    // Analyzer service placeholder: echoes an unreviewed verdict. The
    // production deployment replaces this loop with the real service.
    let (analyzer, mut jobs) = ChannelAnalyzer::new(16);
    let analyzer_task = tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            info!(
                "Analyzer received {} chars of screen text",
                job.request.text.len()
            );
            let _ = job.reply.send(ScanResult {
                is_safe: true,
                label: "unreviewed".to_string(),
                evidence: vec![],
                recommendation: vec![],
            });
        }
    });

    let coordinator = Arc::new(ScanCoordinator::new(
        CaptureSession::new(
            config.capture.resolved_output_dir(),
            config.timing.frame_wait(),
        ),
        TextExtractor::new(&config.extraction),
        Arc::new(NoElementTree),
        Arc::new(analyzer),
        Arc::new(LoggingSink),
    ));

    info!(
        "Engine running (debounce {}ms, fallback every {}s)",
        config.timing.debounce_ms, config.timing.fallback_interval_seconds
    );

    // Run until Ctrl-C
    let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })?;
    tokio::task::spawn_blocking(move || shutdown_rx.recv()).await??;

    info!("🛑 Shutting down");
    fallback.abort();
    analyzer_task.abort();
    coordinator.release_capture().await;
    // The event subscription holds the last other controller handle
    subscription.unsubscribe();
    if let Ok(controller) = Arc::try_unwrap(controller) {
        controller.shutdown();
    }

    Ok(())
}
