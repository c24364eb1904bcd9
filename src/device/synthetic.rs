//! Synthetic transport.
//!
//! Simulates a small camera network in-process. Each `SyntheticCamera` is a
//! cheap clonable view of shared device state: the caller keeps one clone to
//! feed frames, inject failures and inspect what the session wrote, while the
//! bound handle drives the same state from the session side.
//!
//! Frames come from one of two sources:
//! - queued: frames pushed with `push_frame` while grabbing, or armed with
//!   `arm_frame` to arrive as soon as the next stream starts; both bounded by
//!   the buffer count
//! - generated: a fresh test pattern on every retrieval
//!
//! Like a real device, stopping the stream or closing the device flushes the
//! buffers, and frames pushed while the stream is stopped are lost.
//!
//! A retrieval on an empty queue waits on a condition variable, so another
//! thread can hand a frame to a blocked session.

use anyhow::{anyhow, bail, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{
    DeviceHandle, DeviceInfo, DeviceTransport, GrabResult, GrabStrategy, NativeFrame,
    ParameterValue, PixelFormat,
};

/// Buffer count a device uses until told otherwise.
const DEFAULT_MAX_BUFFERS: usize = 10;

/// In-process transport over a fixed set of synthetic cameras.
#[derive(Default)]
pub struct SyntheticTransport {
    cameras: Vec<SyntheticCamera>,
    enumerations: AtomicUsize,
}

impl SyntheticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(mut self, camera: SyntheticCamera) -> Self {
        self.cameras.push(camera);
        self
    }

    pub fn add_camera(&mut self, camera: SyntheticCamera) {
        self.cameras.push(camera);
    }

    /// How many times discovery ran.
    pub fn enumeration_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }
}

impl DeviceTransport for SyntheticTransport {
    type Handle = SyntheticHandle;

    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        Ok(self.cameras.iter().map(|camera| camera.info.clone()).collect())
    }

    fn bind(&self, device: &DeviceInfo) -> Result<SyntheticHandle> {
        let camera = self
            .cameras
            .iter()
            .find(|camera| camera.info == *device)
            .ok_or_else(|| anyhow!("synthetic device {} is not reachable", device.address))?;
        camera.lock()?.handles_bound += 1;
        Ok(SyntheticHandle {
            camera: camera.clone(),
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum FrameSource {
    Queued,
    Generated {
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    },
}

struct CameraState {
    source: FrameSource,
    open: bool,
    grabbing: bool,
    strategy: GrabStrategy,
    max_buffers: usize,
    queue: VecDeque<NativeFrame>,
    armed: VecDeque<NativeFrame>,
    parameters: HashMap<String, ParameterValue>,
    rejected: HashSet<String>,
    pending_failure: Option<(u32, String)>,
    open_failure: Option<String>,
    stop_failure: Option<String>,
    frames_delivered: u64,
    grab_starts: u64,
    handles_bound: u64,
    handles_released: u64,
}

struct Shared {
    state: Mutex<CameraState>,
    frame_ready: Condvar,
}

/// One simulated device.
#[derive(Clone)]
pub struct SyntheticCamera {
    info: DeviceInfo,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SyntheticCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticCamera")
            .field("info", &self.info)
            .finish()
    }
}

impl SyntheticCamera {
    /// A camera that only delivers frames pushed with `push_frame` or
    /// `arm_frame`.
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            shared: Arc::new(Shared {
                state: Mutex::new(CameraState {
                    source: FrameSource::Queued,
                    open: false,
                    grabbing: false,
                    strategy: GrabStrategy::LatestImageOnly,
                    max_buffers: DEFAULT_MAX_BUFFERS,
                    queue: VecDeque::new(),
                    armed: VecDeque::new(),
                    parameters: HashMap::new(),
                    rejected: HashSet::new(),
                    pending_failure: None,
                    open_failure: None,
                    stop_failure: None,
                    frames_delivered: 0,
                    grab_starts: 0,
                    handles_bound: 0,
                    handles_released: 0,
                }),
                frame_ready: Condvar::new(),
            }),
        }
    }

    /// Switch to producing a test pattern on every retrieval.
    pub fn with_generated_frames(self, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        self.state().source = FrameSource::Generated {
            width,
            height,
            pixel_format,
        };
        self
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Deliver a frame into the running stream. When the queue exceeds the
    /// buffer count the oldest frame is dropped. Frames pushed while the
    /// stream is stopped are discarded.
    pub fn push_frame(&self, frame: NativeFrame) {
        let mut state = self.state();
        if !state.grabbing {
            log::debug!(
                "SyntheticCamera: {} not grabbing, frame discarded",
                self.info.address
            );
            return;
        }
        let limit = state.max_buffers.max(1);
        push_bounded(&mut state.queue, frame, limit);
        drop(state);
        self.shared.frame_ready.notify_all();
    }

    /// Hold a frame until the next stream start, as the first exposure of
    /// that stream.
    pub fn arm_frame(&self, frame: NativeFrame) {
        let mut state = self.state();
        let limit = state.max_buffers.max(1);
        push_bounded(&mut state.armed, frame, limit);
    }

    /// Make the next retrieval report a device-side grab failure.
    pub fn fail_next_grab(&self, code: u32, description: &str) {
        self.state().pending_failure = Some((code, description.to_string()));
    }

    /// Make writes to `name` fail.
    pub fn reject_parameter(&self, name: &str) {
        self.state().rejected.insert(name.to_string());
    }

    /// Make `open` fail with `message`.
    pub fn fail_open(&self, message: &str) {
        self.state().open_failure = Some(message.to_string());
    }

    /// Make the next `stop_grabbing` fail with `message`. The stream still
    /// stops.
    pub fn fail_next_stop(&self, message: &str) {
        self.state().stop_failure = Some(message.to_string());
    }

    pub fn parameter(&self, name: &str) -> Option<ParameterValue> {
        self.state().parameters.get(name).cloned()
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn is_grabbing(&self) -> bool {
        self.state().grabbing
    }

    pub fn max_buffers(&self) -> usize {
        self.state().max_buffers
    }

    /// Frames buffered in the running stream.
    pub fn queued_frames(&self) -> usize {
        self.state().queue.len()
    }

    /// Frames waiting for the next stream start.
    pub fn armed_frames(&self) -> usize {
        self.state().armed.len()
    }

    pub fn frames_delivered(&self) -> u64 {
        self.state().frames_delivered
    }

    /// How many times streaming was started.
    pub fn grab_starts(&self) -> u64 {
        self.state().grab_starts
    }

    /// Handles bound and not yet released.
    pub fn live_handles(&self) -> u64 {
        let state = self.state();
        state.handles_bound - state.handles_released
    }

    fn lock(&self) -> Result<MutexGuard<'_, CameraState>> {
        self.shared
            .state
            .lock()
            .map_err(|_| anyhow!("synthetic camera lock poisoned"))
    }

    // Inspection never fails; a poisoned lock still holds usable state.
    fn state(&self) -> MutexGuard<'_, CameraState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle bound to a `SyntheticCamera`.
pub struct SyntheticHandle {
    camera: SyntheticCamera,
}

impl SyntheticHandle {
    pub fn info(&self) -> &DeviceInfo {
        &self.camera.info
    }
}

impl DeviceHandle for SyntheticHandle {
    fn open(&mut self) -> Result<()> {
        let mut state = self.camera.lock()?;
        if let Some(message) = &state.open_failure {
            bail!("open {}: {}", self.camera.info.address, message);
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.camera.lock()?;
        state.grabbing = false;
        state.open = false;
        state.queue.clear();
        drop(state);
        self.camera.shared.frame_ready.notify_all();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.camera.state().open
    }

    fn set_max_buffers(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            bail!("buffer count must be at least 1");
        }
        self.camera.lock()?.max_buffers = count;
        Ok(())
    }

    fn start_grabbing(&mut self, strategy: GrabStrategy) -> Result<()> {
        let mut state = self.camera.lock()?;
        if !state.open {
            bail!("start grabbing on {}: device not open", self.camera.info.address);
        }
        if !state.grabbing {
            state.grabbing = true;
            state.strategy = strategy;
            state.grab_starts += 1;
            let limit = state.max_buffers.max(1);
            let armed: Vec<NativeFrame> = state.armed.drain(..).collect();
            for frame in armed {
                push_bounded(&mut state.queue, frame, limit);
            }
        }
        Ok(())
    }

    fn stop_grabbing(&mut self) -> Result<()> {
        let mut state = self.camera.lock()?;
        state.grabbing = false;
        state.queue.clear();
        let failure = state.stop_failure.take();
        drop(state);
        self.camera.shared.frame_ready.notify_all();
        if let Some(message) = failure {
            bail!("stop grabbing on {}: {}", self.camera.info.address, message);
        }
        Ok(())
    }

    fn is_grabbing(&self) -> bool {
        self.camera.state().grabbing
    }

    fn retrieve(&mut self, timeout: Duration) -> Result<GrabResult> {
        let mut state = self.camera.lock()?;
        if !state.grabbing {
            return Ok(GrabResult::Failed {
                code: 1,
                description: "device is not grabbing".to_string(),
            });
        }
        if let Some((code, description)) = state.pending_failure.take() {
            return Ok(GrabResult::Failed { code, description });
        }
        if let FrameSource::Generated {
            width,
            height,
            pixel_format,
        } = state.source
        {
            state.frames_delivered += 1;
            let frame = generate_frame(width, height, pixel_format, state.frames_delivered)?;
            return Ok(GrabResult::Frame(frame));
        }

        let (mut state, _) = self
            .camera
            .shared
            .frame_ready
            .wait_timeout_while(state, timeout, |s| s.grabbing && s.queue.is_empty())
            .map_err(|_| anyhow!("synthetic camera lock poisoned"))?;

        if !state.grabbing {
            return Ok(GrabResult::Failed {
                code: 2,
                description: "grabbing stopped while waiting".to_string(),
            });
        }
        let frame = match state.strategy {
            GrabStrategy::LatestImageOnly => {
                let newest = state.queue.pop_back();
                state.queue.clear();
                newest
            }
            GrabStrategy::OneByOne => state.queue.pop_front(),
        };
        match frame {
            Some(frame) => {
                state.frames_delivered += 1;
                Ok(GrabResult::Frame(frame))
            }
            None => Ok(GrabResult::Timeout),
        }
    }

    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<()> {
        let mut state = self.camera.lock()?;
        if state.rejected.contains(name) {
            bail!("parameter {} rejected value {}", name, value);
        }
        state.parameters.insert(name.to_string(), value);
        Ok(())
    }
}

impl Drop for SyntheticHandle {
    fn drop(&mut self) {
        let mut state = self.camera.state();
        state.grabbing = false;
        state.open = false;
        state.queue.clear();
        state.handles_released += 1;
        drop(state);
        self.camera.shared.frame_ready.notify_all();
    }
}

fn push_bounded(queue: &mut VecDeque<NativeFrame>, frame: NativeFrame, limit: usize) {
    queue.push_back(frame);
    while queue.len() > limit {
        queue.pop_front();
    }
}

/// Deterministic test pattern; changes with every frame.
fn generate_frame(
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    frame_count: u64,
) -> Result<NativeFrame> {
    let len = pixel_format
        .buffer_len(width, height)
        .ok_or_else(|| anyhow!("synthetic frame dimensions overflow"))?;
    let data = (0..len)
        .map(|i| ((i as u64 + frame_count) % 256) as u8)
        .collect();
    Ok(NativeFrame {
        width,
        height,
        pixel_format,
        data,
    })
}
