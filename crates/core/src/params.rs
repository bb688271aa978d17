//! In-memory parameter store
//!
//! A bounded name/value store for the configuration parameters the engine
//! consumes. Persistence is the platform's concern; this store only tracks
//! values plus a notification generation so the platform can tell listeners
//! when something changed.
//!
//! `set` bumps the notification generation; `set_no_notification` does not.
//! The engine uses the silent variant for self-inflicted migrations (e.g.
//! rewriting a magnetometer rotation slot) that must not retrigger its own
//! parameter-update handling.

use heapless::{FnvIndexMap, String};

/// Maximum parameter name length.
pub const PARAM_NAME_LEN: usize = 16;

/// Maximum number of registered parameters.
pub const MAX_PARAMS: usize = 128;

/// Parameter value (union of supported types).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit floating point
    Float(f32),
}

/// Parameter store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    /// Parameter was never registered
    NotFound,
    /// Name exceeds [`PARAM_NAME_LEN`]
    NameTooLong,
    /// Store capacity exhausted
    Full,
}

impl core::fmt::Display for ParamError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParamError::NotFound => write!(f, "parameter not found"),
            ParamError::NameTooLong => write!(f, "parameter name too long"),
            ParamError::Full => write!(f, "parameter store full"),
        }
    }
}

/// Bounded in-memory parameter store.
#[derive(Debug, Default)]
pub struct ParameterStore {
    values: FnvIndexMap<String<PARAM_NAME_LEN>, ParamValue, MAX_PARAMS>,
    generation: u32,
}

fn key(name: &str) -> Result<String<PARAM_NAME_LEN>, ParamError> {
    let mut key = String::new();
    key.push_str(name).map_err(|_| ParamError::NameTooLong)?;
    Ok(key)
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parameter with its default value.
    ///
    /// Registering an existing name keeps the current value (so defaults can
    /// be re-applied after a load without clobbering stored settings).
    pub fn register(&mut self, name: &str, default: ParamValue) -> Result<(), ParamError> {
        let key = key(name)?;
        if self.values.contains_key(&key) {
            return Ok(());
        }
        self.values.insert(key, default).map_err(|_| ParamError::Full)?;
        Ok(())
    }

    /// Looks a parameter up by name.
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        let key = key(name).ok()?;
        self.values.get(&key).copied()
    }

    /// Returns the value as f32, coercing integers.
    pub fn get_f32(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            ParamValue::Float(v) => Some(v),
            ParamValue::Int(v) => Some(v as f32),
        }
    }

    /// Returns the value as i32, truncating floats.
    pub fn get_i32(&self, name: &str) -> Option<i32> {
        match self.get(name)? {
            ParamValue::Int(v) => Some(v),
            ParamValue::Float(v) => Some(v as i32),
        }
    }

    /// Whether a parameter with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        key(name).map(|k| self.values.contains_key(&k)).unwrap_or(false)
    }

    /// Updates a registered parameter and raises the notification generation.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        self.set_no_notification(name, value)?;
        self.generation = self.generation.wrapping_add(1);
        Ok(())
    }

    /// Updates a registered parameter without notifying listeners.
    pub fn set_no_notification(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        let key = key(name)?;
        if !self.values.contains_key(&key) {
            return Err(ParamError::NotFound);
        }
        // insert cannot fail: the key already exists
        let _ = self.values.insert(key, value);
        Ok(())
    }

    /// Notification generation; bumped by every notifying `set`.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of registered parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
