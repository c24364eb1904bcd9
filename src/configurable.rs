//! Attribute-driven configuration model.
//!
//! An entity lists every attribute it knows as an `(name, accessor, mutator)`
//! triple, and separately declares which of those names it persists. Export and
//! restore walk the declared list; there is no reflective field lookup.
//!
//! Restoring is forward-compatible: keys that are not declared, or that the
//! entity does not know, are skipped so that files written by newer versions
//! still load.

use anyhow::Result;
use serde_json::Value;

use crate::error::CameraError;

/// Name → value mapping exchanged with the persistence layer.
///
/// Keys keep insertion order, so an export lists attributes in declared order.
pub type ConfigMap = serde_json::Map<String, Value>;

/// One persistable attribute of `T`.
pub struct Attribute<T> {
    pub name: &'static str,
    read: fn(&T) -> Value,
    write: fn(&mut T, &Value) -> Result<()>,
}

impl<T> Attribute<T> {
    pub const fn new(
        name: &'static str,
        read: fn(&T) -> Value,
        write: fn(&mut T, &Value) -> Result<()>,
    ) -> Self {
        Self { name, read, write }
    }

    pub fn read(&self, entity: &T) -> Value {
        (self.read)(entity)
    }

    pub fn write(&self, entity: &mut T, value: &Value) -> Result<()> {
        (self.write)(entity, value)
    }
}

impl<T> std::fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute").field("name", &self.name).finish()
    }
}

/// An entity whose declared attributes can be exported to and restored from a
/// [`ConfigMap`].
pub trait Configurable: Clone + 'static {
    /// Every attribute the entity knows how to read and write.
    fn attributes() -> &'static [Attribute<Self>];

    /// Ordered names the entity opts into persisting.
    fn declared_attributes(&self) -> &[String];

    fn attribute(name: &str) -> Option<&'static Attribute<Self>> {
        Self::attributes().iter().find(|attr| attr.name == name)
    }

    /// Read every declared attribute.
    ///
    /// A declared name without an accessor is a construction bug and fails
    /// with [`CameraError::MissingAttribute`]. An accessor yielding `null`
    /// (a NaN or infinite float has no JSON form) fails with
    /// [`CameraError::InvalidAttributeValue`], since the export could not be
    /// restored or written as TOML.
    fn export(&self) -> Result<ConfigMap> {
        let mut map = ConfigMap::new();
        for name in self.declared_attributes() {
            let attr = Self::attribute(name)
                .ok_or_else(|| CameraError::MissingAttribute(name.clone()))?;
            let value = attr.read(self);
            if value.is_null() {
                return Err(CameraError::InvalidAttributeValue {
                    name: name.clone(),
                    expected: "a finite value",
                }
                .into());
            }
            map.insert(name.clone(), value);
        }
        Ok(map)
    }

    /// Overwrite declared attributes with the values present in `data`.
    ///
    /// Unknown keys are ignored. Values are not range-checked; each mutator
    /// only checks that the value fits the field type. Nothing is committed
    /// unless every mutator succeeds.
    fn restore(&mut self, data: &ConfigMap) -> Result<()> {
        let mut staged = self.clone();
        for (key, value) in data {
            if !self.declared_attributes().iter().any(|name| name == key) {
                log::debug!("restore: ignoring undeclared attribute {}", key);
                continue;
            }
            let Some(attr) = Self::attribute(key) else {
                log::debug!("restore: ignoring unknown attribute {}", key);
                continue;
            };
            attr.write(&mut staged, value)?;
        }
        *self = staged;
        Ok(())
    }
}

/// Mutator helper: any JSON number as `f64`.
pub fn float_value(name: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        CameraError::InvalidAttributeValue {
            name: name.to_string(),
            expected: "a number",
        }
        .into()
    })
}

/// Mutator helper: a non-negative integer. Whole floats such as `250.0` are
/// accepted; a fractional part is an error, not truncated.
pub fn unsigned_value(name: &str, value: &Value) -> Result<u64> {
    if let Some(v) = value.as_u64() {
        return Ok(v);
    }
    match value.as_f64() {
        Some(v) if v >= 0.0 && v <= u64::MAX as f64 && v.fract() == 0.0 => Ok(v as u64),
        _ => Err(CameraError::InvalidAttributeValue {
            name: name.to_string(),
            expected: "a non-negative integer",
        }
        .into()),
    }
}

/// Mutator helper: a JSON string.
pub fn string_value(name: &str, value: &Value) -> Result<String> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        CameraError::InvalidAttributeValue {
            name: name.to_string(),
            expected: "a string",
        }
        .into()
    })
}
