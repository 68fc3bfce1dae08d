//! Screen-capture session management.
//!
//! A capture permission arrives as a one-time token tied to a consent
//! dialog. The session converts that token into a long-lived capture
//! context (projection handle, offscreen frame source) exactly once and
//! serves many `capture_frame` calls from it. Any failure tears the whole
//! session down; a half-initialized session is never left reusable.

use crate::types::{CaptureError, CaptureToken};
use image::RgbaImage;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Creates projection handles from consumed permission tokens.
/// Implemented by the platform layer.
pub trait ProjectionFactory: Send + Sync {
    fn create_projection(
        &self,
        result_code: i32,
        permission_payload: &[u8],
    ) -> Result<Box<dyn ProjectionHandle>, CaptureError>;

    /// Full-screen dimensions in pixels
    fn display_size(&self) -> (u32, u32);
}

/// Live projection granted by the OS. The OS may revoke it asynchronously;
/// revocation is observed through the registered callback, never polled.
pub trait ProjectionHandle: Send {
    fn on_stopped(&mut self, callback: Box<dyn Fn() + Send + Sync>);

    fn create_frame_source(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn FrameSource>, CaptureError>;

    fn stop(&mut self);
}

/// Offscreen surface producing buffered frames
pub trait FrameSource: Send {
    /// Most recent buffered frame, if one is ready
    fn latest_frame(&mut self) -> Option<RawFrame>;
}

/// Raw RGBA frame as delivered by the frame source. Rows may carry padding
/// (`row_stride` > `pixel_stride * width`), which conversion strips.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixel_stride: usize,
    pub row_stride: usize,
    pub data: Vec<u8>,
}

/// Single-use storage for a capture token, filled once by the external
/// permission flow. The second take fails instead of re-consuming.
#[derive(Default)]
pub struct TokenSlot {
    token: Option<CaptureToken>,
}

impl TokenSlot {
    pub fn new() -> Self {
        Self { token: None }
    }

    pub fn store(&mut self, token: CaptureToken) {
        debug!("📝 Capture token stored (single use)");
        self.token = Some(token);
    }

    pub fn take(&mut self) -> Result<CaptureToken, CaptureError> {
        self.token.take().ok_or(CaptureError::TokenConsumed)
    }

    pub fn invalidate(&mut self) {
        self.token = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

struct ActiveCapture {
    projection: Box<dyn ProjectionHandle>,
    frames: Box<dyn FrameSource>,
}

/// Reusable capture session. At most one lives in the process; the
/// coordinator owns it and serializes access through the scan lock.
pub struct CaptureSession {
    active: Option<ActiveCapture>,
    /// Flipped by the projection's stop callback on async revocation
    revoked: Arc<AtomicBool>,
    output_dir: PathBuf,
    frame_wait: Duration,
}

impl CaptureSession {
    pub fn new(output_dir: PathBuf, frame_wait: Duration) -> Self {
        Self {
            active: None,
            revoked: Arc::new(AtomicBool::new(false)),
            output_dir,
            frame_wait,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some() && !self.revoked.load(Ordering::SeqCst)
    }

    /// Consume `token` and build the capture context. Idempotent no-op when
    /// the session is already live, so racing callers cannot double-create
    /// the projection.
    pub fn initialize(
        &mut self,
        factory: &dyn ProjectionFactory,
        token: CaptureToken,
    ) -> Result<(), CaptureError> {
        if self.is_initialized() {
            warn!("⚠️ Capture session already active, reusing");
            return Ok(());
        }
        // A revoked leftover context is dead weight; clear it first
        self.release();

        if !token.is_granted() {
            return Err(CaptureError::NoPermission);
        }

        debug!("🎬 Initializing capture session");
        let mut projection =
            factory.create_projection(token.result_code, &token.permission_payload)?;

        let revoked = Arc::new(AtomicBool::new(false));
        let flag = revoked.clone();
        projection.on_stopped(Box::new(move || {
            warn!("⚠️ Projection stopped by system");
            flag.store(true, Ordering::SeqCst);
        }));

        let (width, height) = factory.display_size();
        let frames = match projection.create_frame_source(width, height) {
            Ok(frames) => frames,
            Err(e) => {
                projection.stop();
                return Err(CaptureError::Init(format!(
                    "frame source creation failed: {e}"
                )));
            }
        };

        self.revoked = revoked;
        self.active = Some(ActiveCapture { projection, frames });
        info!("✅ Capture session ready ({}x{})", width, height);
        Ok(())
    }

    /// Grab the most recent frame, persist it as PNG, and return its path.
    ///
    /// Waits once for `frame_wait` when no frame is buffered yet; a second
    /// miss is a capture failure. Every failure tears the session down.
    pub async fn capture_frame(&mut self) -> Result<PathBuf, CaptureError> {
        if self.revoked.load(Ordering::SeqCst) {
            return self.fail(CaptureError::ProjectionRevoked);
        }
        if self.active.is_none() {
            return Err(CaptureError::NotInitialized);
        }

        let started = std::time::Instant::now();

        let mut frame = self.active.as_mut().and_then(|a| a.frames.latest_frame());
        if frame.is_none() {
            // Give the offscreen surface one bounded chance to deliver
            tokio::time::sleep(self.frame_wait).await;
            if self.revoked.load(Ordering::SeqCst) {
                return self.fail(CaptureError::ProjectionRevoked);
            }
            frame = self.active.as_mut().and_then(|a| a.frames.latest_frame());
        }

        let frame = match frame {
            Some(frame) => frame,
            None => return self.fail(CaptureError::FrameUnavailable),
        };

        let image = match raw_frame_to_image(&frame) {
            Some(image) => image,
            None => {
                return self.fail(CaptureError::Init(
                    "frame buffer smaller than advertised geometry".to_string(),
                ))
            }
        };

        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            return self.fail(CaptureError::Io(e));
        }

        let path = self
            .output_dir
            .join(frame_file_name(chrono::Utc::now(), &frame.data));
        if let Err(e) = image.save(&path) {
            return self.fail(CaptureError::Init(format!("failed to save frame: {e}")));
        }

        info!(
            "✅ Frame saved to {:?} in {:?}",
            path,
            started.elapsed()
        );
        Ok(path)
    }

    /// Tear down all held resources. Always safe to call.
    pub fn release(&mut self) {
        if let Some(mut active) = self.active.take() {
            debug!("🛑 Releasing capture session");
            active.projection.stop();
        }
        self.revoked.store(false, Ordering::SeqCst);
    }

    fn fail<T>(&mut self, err: CaptureError) -> Result<T, CaptureError> {
        warn!("Capture failed: {}, tearing session down", err);
        self.release();
        Err(err)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Strip row padding and build an RGBA image from the raw buffer
fn raw_frame_to_image(frame: &RawFrame) -> Option<RgbaImage> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let row_bytes = width.checked_mul(frame.pixel_stride)?;

    let mut rgba = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row_start = y * frame.row_stride;
        let row = frame.data.get(row_start..row_start + row_bytes)?;
        if frame.pixel_stride == 4 {
            rgba.extend_from_slice(row);
        } else {
            for x in 0..width {
                let start = x * frame.pixel_stride;
                let px = row.get(start..start + 4)?;
                rgba.extend_from_slice(px);
            }
        }
    }

    RgbaImage::from_raw(frame.width, frame.height, rgba)
}

/// Timestamped file name with a short content hash to differentiate frames
fn frame_file_name(at: chrono::DateTime<chrono::Utc>, data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hash = hasher.finalize();
    format!(
        "frame_{}_{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}.png",
        at.timestamp_millis(),
        hash[0],
        hash[1],
        hash[2],
        hash[3],
        hash[4],
        hash[5]
    )
}

/// Best-effort cleanup of a persisted frame once the analyzer is done
pub fn remove_frame(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!("Could not remove frame {:?}: {}", path, e);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Scripted platform double shared between unit and integration tests
    pub struct MockProjectionFactory {
        pub frames: Arc<Mutex<VecDeque<RawFrame>>>,
        pub created: Arc<AtomicUsize>,
        pub stop_callback: Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>,
        pub fail_create: bool,
    }

    impl MockProjectionFactory {
        pub fn new() -> Self {
            Self {
                frames: Arc::new(Mutex::new(VecDeque::new())),
                created: Arc::new(AtomicUsize::new(0)),
                stop_callback: Arc::new(Mutex::new(None)),
                fail_create: false,
            }
        }

        pub fn push_frame(&self, frame: RawFrame) {
            self.frames.lock().unwrap().push_back(frame);
        }

        /// Simulate the OS revoking the projection
        pub fn revoke(&self) {
            if let Some(cb) = self.stop_callback.lock().unwrap().as_ref() {
                cb();
            }
        }
    }

    pub fn solid_frame(width: u32, height: u32, row_padding: usize) -> RawFrame {
        let row_stride = width as usize * 4 + row_padding;
        RawFrame {
            width,
            height,
            pixel_stride: 4,
            row_stride,
            data: vec![0x7f; row_stride * height as usize],
        }
    }

    struct MockProjection {
        frames: Arc<Mutex<VecDeque<RawFrame>>>,
        stop_callback: Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>,
    }

    impl ProjectionHandle for MockProjection {
        fn on_stopped(&mut self, callback: Box<dyn Fn() + Send + Sync>) {
            *self.stop_callback.lock().unwrap() = Some(callback);
        }

        fn create_frame_source(
            &mut self,
            _width: u32,
            _height: u32,
        ) -> Result<Box<dyn FrameSource>, CaptureError> {
            Ok(Box::new(MockFrameSource {
                frames: self.frames.clone(),
            }))
        }

        fn stop(&mut self) {}
    }

    struct MockFrameSource {
        frames: Arc<Mutex<VecDeque<RawFrame>>>,
    }

    impl FrameSource for MockFrameSource {
        fn latest_frame(&mut self) -> Option<RawFrame> {
            self.frames.lock().unwrap().pop_front()
        }
    }

    impl ProjectionFactory for MockProjectionFactory {
        fn create_projection(
            &self,
            _result_code: i32,
            _payload: &[u8],
        ) -> Result<Box<dyn ProjectionHandle>, CaptureError> {
            if self.fail_create {
                return Err(CaptureError::Init("consent rejected".to_string()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockProjection {
                frames: self.frames.clone(),
                stop_callback: self.stop_callback.clone(),
            }))
        }

        fn display_size(&self) -> (u32, u32) {
            (8, 4)
        }
    }
}
