/// Logical error kinds raised by the session and the configuration model.
///
/// Fallible functions in this crate return `anyhow::Result`; these variants are
/// wrapped into `anyhow::Error` and can be recovered with
/// `err.downcast_ref::<CameraError>()`. Errors raised by a transport are passed
/// through untouched and are never one of these variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraError {
    /// A required identifying field (address or name) was not supplied.
    Configuration(String),
    /// Discovery returned no devices, or none matched the requested identity.
    DeviceNotFound(String),
    /// A declared persistable attribute has no accessor on the entity.
    MissingAttribute(String),
    /// A restored value cannot be represented in the attribute's type.
    InvalidAttributeValue { name: String, expected: &'static str },
    /// The operation needs a bound device handle.
    NotConnected,
    /// The operation needs an opened device.
    NotOpened,
}

impl CameraError {
    /// Stable short code, useful for log filtering.
    pub fn code(&self) -> &'static str {
        match self {
            CameraError::Configuration(_) => "CAMERA_CONFIGURATION",
            CameraError::DeviceNotFound(_) => "CAMERA_DEVICE_NOT_FOUND",
            CameraError::MissingAttribute(_) => "CAMERA_MISSING_ATTRIBUTE",
            CameraError::InvalidAttributeValue { .. } => "CAMERA_INVALID_ATTRIBUTE_VALUE",
            CameraError::NotConnected => "CAMERA_NOT_CONNECTED",
            CameraError::NotOpened => "CAMERA_NOT_OPENED",
        }
    }
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::Configuration(msg) => write!(f, "{}: {}", self.code(), msg),
            CameraError::DeviceNotFound(msg) => write!(f, "{}: {}", self.code(), msg),
            CameraError::MissingAttribute(name) => {
                write!(f, "{}: missing configuration attribute {}", self.code(), name)
            }
            CameraError::InvalidAttributeValue { name, expected } => write!(
                f,
                "{}: attribute {} expects {}",
                self.code(),
                name,
                expected
            ),
            CameraError::NotConnected => write!(f, "{}: camera is not connected", self.code()),
            CameraError::NotOpened => write!(f, "{}: camera is not opened", self.code()),
        }
    }
}

impl std::error::Error for CameraError {}
