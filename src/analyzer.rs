//! Analyzer collaborator interface.
//!
//! The scam classification itself lives in an external analysis service.
//! The engine's whole contract with it is request-in / result-out, expressed
//! here as an async trait plus a channel-backed client for out-of-process
//! services.

use crate::types::{ScanError, ScanRequest, ScanResult};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// External analysis service seam
#[async_trait]
pub trait ScanAnalyzer: Send + Sync {
    async fn analyze(&self, request: ScanRequest) -> Result<ScanResult, ScanError>;
}

/// A scan request paired with its reply slot
pub struct AnalyzerJob {
    pub request: ScanRequest,
    pub reply: oneshot::Sender<ScanResult>,
}

/// Client that forwards scans to an analyzer service over typed channels.
/// The service side consumes `AnalyzerJob`s and answers through the reply
/// slot; a vanished service maps to `ScanError::Analyzer`.
pub struct ChannelAnalyzer {
    tx: mpsc::Sender<AnalyzerJob>,
}

impl ChannelAnalyzer {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<AnalyzerJob>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ScanAnalyzer for ChannelAnalyzer {
    async fn analyze(&self, request: ScanRequest) -> Result<ScanResult, ScanError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        debug!("📤 Forwarding scan request to analyzer service");

        self.tx
            .send(AnalyzerJob {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ScanError::Analyzer("analyzer service unavailable".to_string()))?;

        reply_rx
            .await
            .map_err(|_| ScanError::Analyzer("analyzer dropped the request".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ScanRequest {
        ScanRequest {
            triggered_at: 1,
            text: "main link: www.example.com | pay here now".to_string(),
            frame_path: None,
        }
    }

    #[tokio::test]
    async fn test_channel_analyzer_roundtrip() {
        let (analyzer, mut rx) = ChannelAnalyzer::new(4);

        let service = tokio::spawn(async move {
            let job = rx.recv().await.unwrap();
            assert!(job.request.text.starts_with("main link:"));
            let _ = job.reply.send(ScanResult {
                is_safe: false,
                label: "phishing".to_string(),
                evidence: vec!["suspicious link".to_string()],
                recommendation: vec!["do not pay".to_string()],
            });
        });

        let result = analyzer.analyze(request()).await.unwrap();
        assert!(!result.is_safe);
        assert_eq!(result.label, "phishing");
        service.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_service_is_an_error() {
        let (analyzer, rx) = ChannelAnalyzer::new(1);
        drop(rx);

        let result = analyzer.analyze(request()).await;
        assert!(matches!(result, Err(ScanError::Analyzer(_))));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_an_error() {
        let (analyzer, mut rx) = ChannelAnalyzer::new(1);

        tokio::spawn(async move {
            let job = rx.recv().await.unwrap();
            drop(job.reply);
        });

        let result = analyzer.analyze(request()).await;
        assert!(matches!(result, Err(ScanError::Analyzer(_))));
    }
}
