use anyhow::Result;
use serde_json::Value;

use crate::configurable::{float_value, string_value, unsigned_value, Attribute, Configurable};

pub const DEFAULT_GAMMA: f64 = 1.0;
pub const DEFAULT_GRAB_TIMEOUT_MS: u64 = 1000;

/// Names persisted by default, in file order.
pub const DEFAULT_DECLARED_ATTRIBUTES: &[&str] = &[
    "ip_address",
    "grab_timeout",
    "exposure_time",
    "frame_rate",
    "gamma",
    "gain",
];

/// Persistable camera parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraSettings {
    /// Device network address; empty means unset.
    pub ip_address: String,
    /// Gamma correction factor.
    pub gamma: f64,
    /// Sensor gain; 0 disables gain. Written to the device in integer units.
    pub gain: f64,
    /// Fixed exposure time in ms; 0 selects continuous auto exposure.
    pub exposure_time: f64,
    /// Frame-rate cap in fps; 0 leaves the rate uncapped.
    pub frame_rate: f64,
    /// Default wait for a single frame, in ms.
    pub grab_timeout: u64,
    declared: Vec<String>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            ip_address: String::new(),
            gamma: DEFAULT_GAMMA,
            gain: 0.0,
            exposure_time: 0.0,
            frame_rate: 0.0,
            grab_timeout: DEFAULT_GRAB_TIMEOUT_MS,
            declared: DEFAULT_DECLARED_ATTRIBUTES
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl CameraSettings {
    /// Replace the declared attribute set.
    pub fn set_declared_attributes<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared = names.into_iter().map(Into::into).collect();
    }

    pub fn with_declared_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_declared_attributes(names);
        self
    }
}

fn read_ip_address(s: &CameraSettings) -> Value {
    Value::from(s.ip_address.clone())
}

fn write_ip_address(s: &mut CameraSettings, v: &Value) -> Result<()> {
    s.ip_address = string_value("ip_address", v)?;
    Ok(())
}

fn read_grab_timeout(s: &CameraSettings) -> Value {
    Value::from(s.grab_timeout)
}

fn write_grab_timeout(s: &mut CameraSettings, v: &Value) -> Result<()> {
    s.grab_timeout = unsigned_value("grab_timeout", v)?;
    Ok(())
}

fn read_exposure_time(s: &CameraSettings) -> Value {
    Value::from(s.exposure_time)
}

fn write_exposure_time(s: &mut CameraSettings, v: &Value) -> Result<()> {
    s.exposure_time = float_value("exposure_time", v)?;
    Ok(())
}

fn read_frame_rate(s: &CameraSettings) -> Value {
    Value::from(s.frame_rate)
}

fn write_frame_rate(s: &mut CameraSettings, v: &Value) -> Result<()> {
    s.frame_rate = float_value("frame_rate", v)?;
    Ok(())
}

fn read_gamma(s: &CameraSettings) -> Value {
    Value::from(s.gamma)
}

fn write_gamma(s: &mut CameraSettings, v: &Value) -> Result<()> {
    s.gamma = float_value("gamma", v)?;
    Ok(())
}

fn read_gain(s: &CameraSettings) -> Value {
    Value::from(s.gain)
}

fn write_gain(s: &mut CameraSettings, v: &Value) -> Result<()> {
    s.gain = float_value("gain", v)?;
    Ok(())
}

const CAMERA_ATTRIBUTES: &[Attribute<CameraSettings>] = &[
    Attribute::new("ip_address", read_ip_address, write_ip_address),
    Attribute::new("grab_timeout", read_grab_timeout, write_grab_timeout),
    Attribute::new("exposure_time", read_exposure_time, write_exposure_time),
    Attribute::new("frame_rate", read_frame_rate, write_frame_rate),
    Attribute::new("gamma", read_gamma, write_gamma),
    Attribute::new("gain", read_gain, write_gain),
];

impl Configurable for CameraSettings {
    fn attributes() -> &'static [Attribute<Self>] {
        CAMERA_ATTRIBUTES
    }

    fn declared_attributes(&self) -> &[String] {
        &self.declared
    }
}
