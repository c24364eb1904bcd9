//! Camera session management.
//!
//! This crate manages the lifecycle of a single network camera:
//! discovery, connection, parameter configuration, bounded-wait image
//! acquisition and teardown. It is written against a small transport
//! capability set (`device::DeviceTransport` / `device::DeviceHandle`) so any
//! vendor SDK exposing discovery, open/close and frame-grab primitives can
//! back it.
//!
//! # Module Structure
//!
//! - `session`: `CameraSession`, the connection state machine and burst capture
//! - `device`: transport traits, discovery records, native frames, and a
//!   synthetic in-process transport
//! - `convert`: native pixel formats to interleaved BGR8
//! - `frame`: `Image` and `Capture`
//! - `configurable` / `settings`: declared-attribute export and restore
//! - `config`: settings files and environment overrides
//!
//! # Soft misses
//!
//! Frame timeouts and failed grabs are not errors. `capture_frame` returns an
//! empty `Image` instead; callers retry. Discovery, connection and parameter
//! failures abort the call and are returned as errors.

pub mod config;
pub mod configurable;
pub mod convert;
pub mod device;
pub mod error;
pub mod frame;
pub mod session;
pub mod settings;

pub use config::{load_settings_file, save_settings_file, SessionConfig};
pub use configurable::{Attribute, ConfigMap, Configurable};
pub use convert::{BitAlignment, PixelConverter};
pub use device::{
    DeviceHandle, DeviceInfo, DeviceTransport, GrabResult, GrabStrategy, NativeFrame,
    ParameterValue, PixelFormat, SyntheticCamera, SyntheticTransport,
};
pub use error::CameraError;
pub use frame::{Capture, Image};
pub use session::{CameraSession, SessionState, MAX_NUM_BUFFERS};
pub use settings::CameraSettings;
