//! Camera session.
//!
//! `CameraSession` binds one physical camera and walks it through
//! `Disconnected → Connected → Opened`, with grabbing as a transient sub-state
//! of `Opened`.
//!
//! Acquisition is bursty on purpose: `capture_frame` starts the stream, takes
//! one frame and stops it again, so several cameras can share a network
//! without continuous streams saturating it. Continuous streaming is only
//! reachable through the private start/stop primitives.
//!
//! All calls block the owning thread. A session is not meant to be shared
//! between threads; callers serialise access themselves. The only way to
//! abandon a blocked retrieval early is to close the session, which tears the
//! device down.

use anyhow::Result;
use std::time::Duration;

use crate::configurable::{ConfigMap, Configurable};
use crate::convert::{BitAlignment, PixelConverter};
use crate::device::{
    features, DeviceHandle, DeviceInfo, DeviceTransport, GrabResult, GrabStrategy, ParameterValue,
};
use crate::error::CameraError;
use crate::frame::{Capture, Image};
use crate::settings::CameraSettings;

/// Frame buffers allocated per device. Enough for the latest few frames;
/// fresh frames win over a complete history.
pub const MAX_NUM_BUFFERS: usize = 5;

/// Observable lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Opened,
    Grabbing,
}

/// Which discovery field a connect call matches on.
#[derive(Clone, Copy, Debug)]
enum DeviceSelector<'a> {
    Address(&'a str),
    Name(&'a str),
}

impl DeviceSelector<'_> {
    fn matches(&self, device: &DeviceInfo) -> bool {
        match self {
            DeviceSelector::Address(address) => device.address == *address,
            DeviceSelector::Name(name) => device.user_defined_name == *name,
        }
    }

    fn describe(&self) -> String {
        match self {
            DeviceSelector::Address(address) => format!("address {}", address),
            DeviceSelector::Name(name) => format!("name {}", name),
        }
    }
}

/// One logical binding to a physical camera.
pub struct CameraSession<T: DeviceTransport> {
    transport: T,
    settings: CameraSettings,
    device: Option<T::Handle>,
    device_info: Option<DeviceInfo>,
    converter: Option<PixelConverter>,
    connected: bool,
    opened: bool,
}

impl<T: DeviceTransport> std::fmt::Debug for CameraSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("settings", &self.settings)
            .field("device_info", &self.device_info)
            .field("connected", &self.connected)
            .field("opened", &self.opened)
            .finish()
    }
}

impl<T: DeviceTransport> CameraSession<T> {
    /// New session with default settings.
    pub fn new(transport: T) -> Self {
        Self::with_settings(transport, CameraSettings::default())
    }

    pub fn with_settings(transport: T, settings: CameraSettings) -> Self {
        Self {
            transport,
            settings,
            device: None,
            device_info: None,
            converter: None,
            connected: false,
            opened: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Settings take effect on the device at the next `apply_parameters`.
    pub fn settings_mut(&mut self) -> &mut CameraSettings {
        &mut self.settings
    }

    pub fn export(&self) -> Result<ConfigMap> {
        self.settings.export()
    }

    pub fn restore(&mut self, data: &ConfigMap) -> Result<()> {
        self.settings.restore(data)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    pub fn is_grabbing(&self) -> bool {
        self.opened && self.device.as_ref().is_some_and(|d| d.is_grabbing())
    }

    pub fn state(&self) -> SessionState {
        if self.is_grabbing() {
            SessionState::Grabbing
        } else if self.opened {
            SessionState::Opened
        } else if self.connected {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// Discovery record of the bound device.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    /// Enumerate reachable devices without binding any.
    pub fn available_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.transport.enumerate()
    }

    /// Bind the device whose network address matches.
    ///
    /// A non-empty `address` replaces the stored `ip_address`; an empty one
    /// reuses it. Any previously bound device is released first, so a failed
    /// attempt leaves the session disconnected.
    pub fn connect_by_address(&mut self, address: &str) -> Result<()> {
        self.release_device();
        if !address.is_empty() {
            self.settings.ip_address = address.to_string();
        }
        if self.settings.ip_address.is_empty() {
            return Err(
                CameraError::Configuration("camera IP address is not defined".into()).into(),
            );
        }
        let address = self.settings.ip_address.clone();
        self.bind(DeviceSelector::Address(&address))
    }

    /// Bind the device whose user-defined name matches.
    pub fn connect_by_name(&mut self, name: &str) -> Result<()> {
        self.release_device();
        if name.is_empty() {
            return Err(CameraError::Configuration("camera name is not defined".into()).into());
        }
        self.bind(DeviceSelector::Name(name))
    }

    fn bind(&mut self, selector: DeviceSelector<'_>) -> Result<()> {
        let devices = self.transport.enumerate()?;
        if devices.is_empty() {
            return Err(CameraError::DeviceNotFound("no camera devices detected".into()).into());
        }
        let info = devices
            .into_iter()
            .find(|device| selector.matches(device))
            .ok_or_else(|| {
                CameraError::DeviceNotFound(format!(
                    "camera with {} not found",
                    selector.describe()
                ))
            })?;

        let mut device = self.transport.bind(&info)?;
        device.set_max_buffers(MAX_NUM_BUFFERS)?;

        log::info!("CameraSession: connected to {}", info.full_name());
        self.device = Some(device);
        self.device_info = Some(info);
        self.connected = true;
        Ok(())
    }

    /// Push the stored settings to the device.
    ///
    /// Device rejections are returned as the transport reported them.
    pub fn apply_parameters(&mut self) -> Result<()> {
        let settings = self.settings.clone();
        let device = self.connected_device()?;

        device.set_parameter(features::GAMMA, ParameterValue::Float(settings.gamma))?;
        device.set_parameter(
            features::GAIN_AUTO,
            ParameterValue::enumeration(features::AUTO_OFF),
        )?;
        device.set_parameter(
            features::GAIN,
            ParameterValue::Integer(settings.gain.trunc() as i64),
        )?;

        if settings.exposure_time > 0.0 {
            device.set_parameter(
                features::EXPOSURE_AUTO,
                ParameterValue::enumeration(features::AUTO_OFF),
            )?;
            device.set_parameter(
                features::EXPOSURE_TIME,
                ParameterValue::Float(settings.exposure_time),
            )?;
        } else {
            device.set_parameter(
                features::EXPOSURE_AUTO,
                ParameterValue::enumeration(features::AUTO_CONTINUOUS),
            )?;
        }

        if settings.frame_rate > 0.0 {
            device.set_parameter(
                features::ACQUISITION_FRAME_RATE_ENABLE,
                ParameterValue::Boolean(true),
            )?;
            device.set_parameter(
                features::ACQUISITION_FRAME_RATE,
                ParameterValue::Float(settings.frame_rate),
            )?;
        } else {
            device.set_parameter(
                features::ACQUISITION_FRAME_RATE_ENABLE,
                ParameterValue::Boolean(false),
            )?;
        }
        Ok(())
    }

    /// Open communication and prepare the pixel converter. No-op when
    /// already opened.
    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.connected_device()?.open()?;
        self.converter = Some(PixelConverter::new(BitAlignment::MsbAligned));
        self.opened = true;
        if let Some(info) = &self.device_info {
            log::info!("CameraSession: opened {}", info.full_name());
        }
        Ok(())
    }

    /// Take one frame, or the empty image on a soft miss.
    ///
    /// A missing or zero `timeout` uses the `grab_timeout` setting. If the
    /// stream is not running it is started for this one frame and stopped
    /// again; a running stream is left running.
    pub fn capture_frame(&mut self, timeout: Option<Duration>) -> Result<Image> {
        self.in_burst(|session| session.retrieve_frame(timeout))
    }

    /// Like `capture_frame`, but tells a timeout apart from a failed grab.
    pub fn capture(&mut self, timeout: Option<Duration>) -> Result<Capture> {
        self.in_burst(|session| session.retrieve(timeout))
    }

    /// Run one retrieval, starting and stopping the stream around it unless
    /// it was already running.
    fn in_burst<R>(&mut self, retrieve: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if !self.opened {
            return Err(CameraError::NotOpened.into());
        }
        let burst = !self.is_grabbing();
        if burst {
            log::debug!("CameraSession: starting single-frame burst");
            self.start_grabbing()?;
        }
        let outcome = retrieve(self);
        if burst {
            if let Err(err) = self.stop_grabbing() {
                // A retrieval error takes precedence over a stop error.
                if outcome.is_ok() {
                    return Err(err);
                }
                log::warn!("CameraSession: failed to stop burst: {}", err);
            }
        }
        outcome
    }

    /// Close the session. Safe to call repeatedly.
    ///
    /// Stops any stream and closes I/O if the device was opened, then
    /// releases the handle.
    pub fn close(&mut self) -> Result<()> {
        let mut result = Ok(());
        if self.opened {
            if let Some(device) = self.device.as_mut() {
                result = close_device(device);
            }
            self.opened = false;
            if let Some(info) = &self.device_info {
                log::info!("CameraSession: closed {}", info.full_name());
            }
        }
        self.device = None;
        self.device_info = None;
        self.converter = None;
        self.connected = false;
        result
    }

    fn start_grabbing(&mut self) -> Result<()> {
        if !self.opened {
            return Ok(());
        }
        let device = self.connected_device()?;
        if !device.is_grabbing() {
            device.start_grabbing(GrabStrategy::LatestImageOnly)?;
        }
        Ok(())
    }

    fn stop_grabbing(&mut self) -> Result<()> {
        if !self.opened {
            return Ok(());
        }
        let device = self.connected_device()?;
        if device.is_grabbing() {
            device.stop_grabbing()?;
        }
        Ok(())
    }

    /// Single retrieval from a running stream. Returns the empty image when
    /// the stream is not running or nothing arrived in time.
    fn retrieve_frame(&mut self, timeout: Option<Duration>) -> Result<Image> {
        self.retrieve(timeout).map(Capture::into_image)
    }

    fn retrieve(&mut self, timeout: Option<Duration>) -> Result<Capture> {
        let timeout = match timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => Duration::from_millis(self.settings.grab_timeout),
        };
        let (Some(device), Some(converter)) = (self.device.as_mut(), self.converter.as_ref())
        else {
            return Ok(Capture::Failed {
                reason: "camera is not opened".into(),
            });
        };
        if !device.is_grabbing() {
            return Ok(Capture::Failed {
                reason: "camera is not grabbing".into(),
            });
        }

        // The native buffer is dropped at the end of this match, after
        // conversion, so the device slot is not held.
        match device.retrieve(timeout)? {
            GrabResult::Frame(native) => match converter.convert(&native) {
                Ok(image) => Ok(Capture::Frame(image)),
                Err(err) => {
                    log::warn!("CameraSession: dropping unconvertible frame: {}", err);
                    Ok(Capture::Failed {
                        reason: err.to_string(),
                    })
                }
            },
            GrabResult::Timeout => {
                log::debug!(
                    "CameraSession: no frame within {} ms",
                    timeout.as_millis()
                );
                Ok(Capture::Timeout)
            }
            GrabResult::Failed { code, description } => {
                log::warn!("CameraSession: grab failed ({}): {}", code, description);
                Ok(Capture::Failed {
                    reason: format!("{}: {}", code, description),
                })
            }
        }
    }

    fn connected_device(&mut self) -> Result<&mut T::Handle> {
        if !self.connected {
            return Err(CameraError::NotConnected.into());
        }
        self.device
            .as_mut()
            .ok_or_else(|| CameraError::NotConnected.into())
    }

    /// Drop any bound handle, closing it first if it was opened.
    fn release_device(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("CameraSession: error while releasing previous device: {}", err);
        }
    }
}

fn close_device<H: DeviceHandle>(device: &mut H) -> Result<()> {
    if device.is_grabbing() {
        device.stop_grabbing()?;
    }
    device.close()
}

impl<T: DeviceTransport> Drop for CameraSession<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("CameraSession: error while closing on drop: {}", err);
        }
    }
}
