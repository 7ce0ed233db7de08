//! Flags that can be flipped while the service runs.

use super::ConversionConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Runtime-mutable conversion switches, seeded from [`ConversionConfig`].
#[derive(Debug)]
pub struct RuntimeFlags {
    auto_convert: AtomicBool,
    delete_after: AtomicBool,
    overwrite_existing: AtomicBool,
}

/// JSON view of [`RuntimeFlags`] served by `GET /api/config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagsSnapshot {
    pub auto_convert: bool,
    pub delete_after: bool,
    pub overwrite_existing: bool,
}

/// Partial update accepted by `POST /api/config`; absent fields are untouched.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagsUpdate {
    pub auto_convert: Option<bool>,
    pub delete_after: Option<bool>,
    pub overwrite_existing: Option<bool>,
}

impl RuntimeFlags {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            auto_convert: AtomicBool::new(config.auto_convert),
            delete_after: AtomicBool::new(config.delete_after),
            overwrite_existing: AtomicBool::new(config.overwrite_existing),
        }
    }

    pub fn auto_convert(&self) -> bool {
        self.auto_convert.load(Ordering::SeqCst)
    }

    pub fn delete_after(&self) -> bool {
        self.delete_after.load(Ordering::SeqCst)
    }

    pub fn overwrite_existing(&self) -> bool {
        self.overwrite_existing.load(Ordering::SeqCst)
    }

    pub fn set_auto_convert(&self, value: bool) {
        self.auto_convert.store(value, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> FlagsSnapshot {
        FlagsSnapshot {
            auto_convert: self.auto_convert(),
            delete_after: self.delete_after(),
            overwrite_existing: self.overwrite_existing(),
        }
    }

    /// Apply a partial update and return the resulting state.
    pub fn apply(&self, update: FlagsUpdate) -> FlagsSnapshot {
        if let Some(v) = update.auto_convert {
            self.auto_convert.store(v, Ordering::SeqCst);
        }
        if let Some(v) = update.delete_after {
            self.delete_after.store(v, Ordering::SeqCst);
        }
        if let Some(v) = update.overwrite_existing {
            self.overwrite_existing.store(v, Ordering::SeqCst);
        }
        self.snapshot()
    }
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self::new(&ConversionConfig::default())
    }
}
