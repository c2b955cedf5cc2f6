//! Live preview stream controller.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use super::task::{RepeatingTask, TickControl};
use crate::camera::{CameraError, CameraSession, PreviewFrame, SessionStatus};
use crate::handles::{HandleRegistry, ObjectHandle};

/// Default time between preview requests.
pub const DEFAULT_PREVIEW_INTERVAL: Duration = Duration::from_millis(500);

/// Preview controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

struct LatestFrame {
    handle: ObjectHandle,
    frame: Arc<PreviewFrame>,
}

/// The single "latest frame" slot plus stream bookkeeping.
struct Slot {
    state: StreamState,
    /// Bumped on every start; frames from an older run are discarded
    epoch: u64,
    latest: Option<LatestFrame>,
    frames_received: u64,
}

type SharedSlot = Arc<Mutex<Slot>>;

fn lock_slot(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Move to Idle and release the held frame.
///
/// With `epoch` set, only acts if that run is still the current one.
fn release(slot: &SharedSlot, epoch: Option<u64>) {
    let released = {
        let mut slot = lock_slot(slot);
        if epoch.is_some_and(|e| e != slot.epoch) {
            return;
        }
        slot.state = StreamState::Idle;
        slot.latest.take()
    };
    if let Some(latest) = released {
        log::debug!("Releasing preview handle {}", latest.handle.id());
    }
}

/// Install `frame` as the latest one. Returns false if the run is over.
///
/// `connected` is whether the frame came from the connection this run was
/// started on.
fn install(
    slot: &SharedSlot,
    registry: &Arc<dyn HandleRegistry>,
    epoch: u64,
    connected: bool,
    frame: PreviewFrame,
) -> bool {
    let mut slot = lock_slot(slot);
    if slot.state != StreamState::Streaming || slot.epoch != epoch {
        log::debug!("Discarding preview frame that arrived after the stream stopped");
        return false;
    }
    if !connected {
        log::debug!("Discarding preview frame from a replaced connection");
        return false;
    }

    // The previous handle must be gone before the next one exists.
    drop(slot.latest.take());

    let frame = Arc::new(frame);
    let handle = ObjectHandle::new(Arc::clone(registry), &frame.mime_type, frame.len());
    slot.latest = Some(LatestFrame { handle, frame });
    slot.frames_received += 1;
    true
}

/// Resolves once the session leaves the connection it had at `generation`.
async fn session_ended(mut status_rx: watch::Receiver<SessionStatus>, generation: u64) {
    loop {
        let current = *status_rx.borrow_and_update();
        if current != (SessionStatus::Connected { generation }) {
            return;
        }
        if status_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Polls preview frames from a session while it is connected.
///
/// Holds exactly one latest frame; the handle of the previous frame is
/// released before a new one is installed, and the last one on stop.
pub struct PreviewStream {
    session: Arc<CameraSession>,
    registry: Arc<dyn HandleRegistry>,
    interval: Duration,
    slot: SharedSlot,
    task: Option<RepeatingTask>,
}

impl PreviewStream {
    pub fn new(session: Arc<CameraSession>, registry: Arc<dyn HandleRegistry>) -> Self {
        Self {
            session,
            registry,
            interval: DEFAULT_PREVIEW_INTERVAL,
            slot: Arc::new(Mutex::new(Slot {
                state: StreamState::Idle,
                epoch: 0,
                latest: None,
                frames_received: 0,
            })),
            task: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> StreamState {
        lock_slot(&self.slot).state
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// The most recent frame, if any.
    pub fn latest_frame(&self) -> Option<Arc<PreviewFrame>> {
        lock_slot(&self.slot)
            .latest
            .as_ref()
            .map(|latest| Arc::clone(&latest.frame))
    }

    /// Id of the handle currently displaying the latest frame.
    pub fn preview_handle(&self) -> Option<String> {
        lock_slot(&self.slot)
            .latest
            .as_ref()
            .map(|latest| latest.handle.id().to_string())
    }

    /// Frames installed since the controller was created.
    pub fn frames_received(&self) -> u64 {
        lock_slot(&self.slot).frames_received
    }

    /// Start polling.
    ///
    /// Returns `Ok(false)` without scheduling anything if the camera cannot
    /// preview. Starting a running stream is a no-op.
    pub async fn start(&mut self) -> Result<bool, CameraError> {
        if self.is_streaming() {
            return Ok(true);
        }

        let ops = self.session.get_supported_ops().await?;
        if !ops.capture_preview {
            log::info!("Camera does not support preview capture, stream stays idle");
            return Ok(false);
        }

        let SessionStatus::Connected { generation } = self.session.status() else {
            return Err(CameraError::NotConnected);
        };

        // A previous run may have ended on its own; make sure its task is gone.
        if let Some(task) = self.task.take() {
            task.stop();
        }

        let epoch = {
            let mut slot = lock_slot(&self.slot);
            slot.epoch += 1;
            slot.state = StreamState::Streaming;
            slot.epoch
        };

        let shutdown = {
            let slot = Arc::clone(&self.slot);
            let status_rx = self.session.subscribe();
            async move {
                session_ended(status_rx, generation).await;
                log::info!("Camera disconnected, stopping preview");
                release(&slot, Some(epoch));
            }
        };

        let session = Arc::clone(&self.session);
        let registry = Arc::clone(&self.registry);
        let slot = Arc::clone(&self.slot);
        let tick = move || {
            let session = Arc::clone(&session);
            let registry = Arc::clone(&registry);
            let slot = Arc::clone(&slot);
            async move {
                let installed = session
                    .with_preview_frame(|frame| {
                        let connected = session.status() == SessionStatus::Connected { generation };
                        install(&slot, &registry, epoch, connected, frame)
                    })
                    .await;
                match installed {
                    Ok(true) => TickControl::Continue,
                    Ok(false) => TickControl::Stop,
                    Err(CameraError::NotConnected) => {
                        release(&slot, Some(epoch));
                        TickControl::Stop
                    }
                    Err(e) => {
                        // Keep the previous frame up; the camera is often just busy.
                        log::warn!("Preview error: {}", e);
                        TickControl::Continue
                    }
                }
            }
        };

        log::info!("Starting preview stream (every {:?})", self.interval);
        self.task = Some(RepeatingTask::spawn(self.interval, shutdown, tick));
        Ok(true)
    }

    /// Stop polling and release the held frame. Idempotent.
    ///
    /// A request already in flight is not aborted; its frame is discarded.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.stop();
            log::info!("Preview stream stopped");
        }
        release(&self.slot, None);
    }
}

impl Drop for PreviewStream {
    fn drop(&mut self) {
        self.stop();
    }
}
