//! QR scanning task
//!
//! Pulls frames from a camera, hands each to an external decoder and stops
//! at the first payload that parses as a UPI intent. The task owns its
//! shutdown channel; `stop()` takes effect before the next frame and always
//! releases the camera.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::CameraError;
use crate::intent::{parse_intent, ScannedIntent};

/// Roughly one animation frame
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Environment,
    Any,
}

/// Requested camera settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConstraints {
    pub facing: Facing,
    pub min_width: u32,
    pub ideal_width: u32,
    pub min_height: u32,
    pub ideal_height: u32,
}

impl ScanConstraints {
    /// Rear camera at 720p
    pub fn preferred() -> Self {
        Self {
            facing: Facing::Environment,
            min_width: 320,
            ideal_width: 1280,
            min_height: 240,
            ideal_height: 720,
        }
    }

    /// Retry settings after the device rejected the preferred ones
    pub fn basic() -> Self {
        Self {
            facing: Facing::Any,
            min_width: 320,
            ideal_width: 640,
            min_height: 240,
            ideal_height: 480,
        }
    }
}

/// One captured image
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// RGBA pixels
    pub data: Bytes,
}

/// Camera stream
#[async_trait]
pub trait FrameSource: Send {
    async fn open(&mut self, constraints: ScanConstraints) -> Result<(), CameraError>;

    /// Next frame, or None when the video has no data yet
    async fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Stop every track. Must be safe to call more than once.
    async fn close(&mut self);
}

/// External QR decoding capability
pub trait QrDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Started,
    Decoded(ScannedIntent),
    /// A QR code that is not a UPI intent; scanning goes on
    Invalid(String),
    Failed(CameraError),
    Stopped,
}

/// Handle to a running scan
pub struct ScanTask {
    shutdown_tx: Option<mpsc::Sender<()>>,
    events: mpsc::Receiver<ScanEvent>,
    handle: JoinHandle<()>,
}

impl ScanTask {
    pub fn spawn<S>(source: S, decoder: Arc<dyn QrDecoder>, frame_interval: Duration) -> Self
    where
        S: FrameSource + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (events_tx, events) = mpsc::channel(32);
        let handle = tokio::spawn(scan_loop(
            source,
            decoder,
            frame_interval,
            shutdown_rx,
            events_tx,
        ));
        Self {
            shutdown_tx: Some(shutdown_tx),
            events,
            handle,
        }
    }

    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Cancel the scan and wait for the camera to be released
    pub async fn stop(self) {
        let ScanTask {
            shutdown_tx,
            events,
            handle,
        } = self;
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(()).await;
        }
        // Unblocks a loop parked on a full event channel
        drop(events);
        if let Err(e) = handle.await {
            warn!(error = %e, "Scan task ended abnormally");
        }
    }
}

async fn open_with_retry<S: FrameSource>(source: &mut S) -> Result<(), CameraError> {
    match source.open(ScanConstraints::preferred()).await {
        Err(CameraError::Overconstrained) => {
            info!("Camera rejected preferred constraints, retrying with basic settings");
            source.open(ScanConstraints::basic()).await
        }
        other => other,
    }
}

async fn scan_loop<S: FrameSource>(
    mut source: S,
    decoder: Arc<dyn QrDecoder>,
    frame_interval: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
    events: mpsc::Sender<ScanEvent>,
) {
    if let Err(e) = open_with_retry(&mut source).await {
        warn!(error = %e, "Could not start camera");
        source.close().await;
        let _ = events.send(ScanEvent::Failed(e)).await;
        let _ = events.send(ScanEvent::Stopped).await;
        return;
    }
    let _ = events.send(ScanEvent::Started).await;

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            frame = source.next_frame() => frame,
        };

        match frame {
            Ok(Some(frame)) => {
                if let Some(payload) = decoder.decode(&frame) {
                    match parse_intent(&payload) {
                        Ok(intent) => {
                            debug!(upi_id = %intent.upi_id, "UPI QR code decoded");
                            let _ = events.send(ScanEvent::Decoded(intent)).await;
                            break;
                        }
                        Err(e) => {
                            debug!(error = %e, "QR code is not a UPI intent");
                            let _ = events.send(ScanEvent::Invalid(payload)).await;
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Camera stream failed");
                let _ = events.send(ScanEvent::Failed(e)).await;
                break;
            }
        }

        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(frame_interval) => {}
        }
    }

    source.close().await;
    let _ = events.send(ScanEvent::Stopped).await;
}
