//! Device transport boundary.
//!
//! `CameraSession` is written against this capability set only:
//! - enumerate reachable devices
//! - bind a discovery record to a handle
//! - open / close the handle
//! - start / stop streaming
//! - retrieve one frame with a timeout
//! - set a scalar parameter by name
//!
//! A vendor SDK binding implements `DeviceTransport` and `DeviceHandle`.
//! Errors returned by these traits are the transport's own and are propagated
//! by the session without translation.

pub mod synthetic;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use synthetic::{SyntheticCamera, SyntheticTransport};

/// Standard feature names written by `CameraSession::apply_parameters`.
pub mod features {
    pub const GAMMA: &str = "Gamma";
    pub const GAIN_AUTO: &str = "GainAuto";
    pub const GAIN: &str = "Gain";
    pub const EXPOSURE_AUTO: &str = "ExposureAuto";
    pub const EXPOSURE_TIME: &str = "ExposureTime";
    pub const ACQUISITION_FRAME_RATE_ENABLE: &str = "AcquisitionFrameRateEnable";
    pub const ACQUISITION_FRAME_RATE: &str = "AcquisitionFrameRate";

    pub const AUTO_OFF: &str = "Off";
    pub const AUTO_CONTINUOUS: &str = "Continuous";
}

/// Discovery record for one reachable device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Network address, e.g. "192.168.0.12".
    pub address: String,
    /// Logical name assigned on the device itself.
    pub user_defined_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial_number: String,
}

impl DeviceInfo {
    pub fn new(address: impl Into<String>, user_defined_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user_defined_name: user_defined_name.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_serial(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = serial_number.into();
        self
    }

    /// Human-readable identity used in log lines.
    pub fn full_name(&self) -> String {
        let name = if self.user_defined_name.is_empty() {
            self.model_name.as_str()
        } else {
            self.user_defined_name.as_str()
        };
        if name.is_empty() {
            self.address.clone()
        } else {
            format!("{} ({})", name, self.address)
        }
    }
}

/// Scalar parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParameterValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Enumeration(String),
}

impl ParameterValue {
    pub fn enumeration(value: &str) -> Self {
        ParameterValue::Enumeration(value.to_string())
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Integer(v) => write!(f, "{}", v),
            ParameterValue::Boolean(v) => write!(f, "{}", v),
            ParameterValue::Enumeration(v) => f.write_str(v),
        }
    }
}

/// How the device hands buffered frames to `retrieve`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrabStrategy {
    /// Only the newest buffered frame is delivered; older ones are dropped.
    LatestImageOnly,
    /// Frames are delivered in arrival order.
    OneByOne,
}

/// Sensor-native pixel layouts a device may deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Mono8,
    /// 12 significant bits in little-endian 16-bit containers.
    Mono12,
    Rgb8,
    Bgr8,
    BayerRg8,
    /// YUYV 4:2:2.
    Yuv422Packed,
}

impl PixelFormat {
    /// Buffer size in bytes for a frame of the given dimensions.
    pub fn buffer_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        let per_pixel = match self {
            PixelFormat::Mono8 | PixelFormat::BayerRg8 => 1,
            PixelFormat::Mono12 | PixelFormat::Yuv422Packed => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        };
        pixels.checked_mul(per_pixel)
    }
}

/// A frame as delivered by the device, before conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeFrame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: Vec<u8>,
}

/// Outcome of a single bounded-wait retrieval.
#[derive(Debug)]
pub enum GrabResult {
    Frame(NativeFrame),
    Timeout,
    Failed { code: u32, description: String },
}

/// Discovery and binding side of a transport.
pub trait DeviceTransport {
    type Handle: DeviceHandle;

    /// List reachable devices.
    fn enumerate(&self) -> Result<Vec<DeviceInfo>>;

    /// Create a handle for a discovered device. The handle is not opened.
    fn bind(&self, device: &DeviceInfo) -> Result<Self::Handle>;
}

/// A bound device. Dropping the handle releases it.
pub trait DeviceHandle {
    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Number of frame buffers allocated for grabbing.
    fn set_max_buffers(&mut self, count: usize) -> Result<()>;

    fn start_grabbing(&mut self, strategy: GrabStrategy) -> Result<()>;

    fn stop_grabbing(&mut self) -> Result<()>;

    fn is_grabbing(&self) -> bool;

    /// Wait up to `timeout` for one frame.
    ///
    /// The returned buffer is owned by the caller; the device slot it came
    /// from is free again once this returns.
    fn retrieve(&mut self, timeout: Duration) -> Result<GrabResult>;

    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<()>;
}
