//! Validated key-value boundary used to entrust the analysis history to the
//! shell's storage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::Event;

pub const MAX_KEY_LENGTH: usize = 256;
pub const MAX_VALUE_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    #[must_use]
    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect(),
                reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
            });
        }

        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot contain path sequences".to_string(),
            });
        }

        if key.chars().any(char::is_control) {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key contains control characters".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    History,
    Settings,
}

impl KeyNamespace {
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Settings => "settings",
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl KvError {
    fn from_backend(e: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: e.to_string(),
        }
    }
}

/// Writes a value through the shell's store. Size violations are caught here,
/// before an effect is ever emitted.
pub fn write<F>(
    kv: &crux_kv::KeyValue<Event>,
    key: &KvKey,
    value: Vec<u8>,
    make_event: F,
) -> Result<(), KvError>
where
    F: FnOnce(Result<(), KvError>) -> Event + Send + Sync + 'static,
{
    if value.len() > MAX_VALUE_SIZE {
        return Err(KvError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }

    kv.set(key.raw(), value, move |result| {
        make_event(result.map(|_| ()).map_err(KvError::from_backend))
    });

    Ok(())
}

/// Reads a value; `Ok(None)` means the key has never been written.
pub fn read<F>(kv: &crux_kv::KeyValue<Event>, key: &KvKey, make_event: F)
where
    F: FnOnce(Result<Option<Vec<u8>>, KvError>) -> Event + Send + Sync + 'static,
{
    kv.get(key.raw(), move |result| {
        make_event(result.map_err(KvError::from_backend))
    });
}

/// Removes a value; missing keys are not an error.
pub fn delete<F>(kv: &crux_kv::KeyValue<Event>, key: &KvKey, make_event: F)
where
    F: FnOnce(Result<(), KvError>) -> Event + Send + Sync + 'static,
{
    kv.delete(key.raw(), move |result| {
        make_event(result.map(|_| ()).map_err(KvError::from_backend))
    });
}
