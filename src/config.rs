//! Engine configuration: search guards and encoding defaults.
//!
//! Every knob has a default; a JSON file only needs to name what it overrides.

use crate::error::DomainError;
use crate::types::TypeDefaults;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on live parsing/specializing paths; extra branches are dropped.
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,
    /// Upper bound on pending relation callbacks per path.
    #[serde(default = "default_max_callbacks")]
    pub max_callbacks: usize,
    /// Iteration cap for repeats without an explicit maximum and for counts read from a field.
    #[serde(default = "default_max_repeat")]
    pub max_repeat: usize,
    /// Length cap when generating values of unbounded types.
    #[serde(default = "default_max_generated_bits")]
    pub max_generated_bits: usize,
    #[serde(default)]
    pub type_defaults: TypeDefaults,
}

fn default_max_paths() -> usize {
    4096
}

fn default_max_callbacks() -> usize {
    64
}

fn default_max_repeat() -> usize {
    255
}

/// 8192 bytes. Byte-oriented types need a multiple of 8, so this is 65536 bits rather
/// than 65535.
fn default_max_generated_bits() -> usize {
    8192 * 8
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_paths: default_max_paths(),
            max_callbacks: default_max_callbacks(),
            max_repeat: default_max_repeat(),
            max_generated_bits: default_max_generated_bits(),
            type_defaults: TypeDefaults::default(),
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DomainError> {
        let s = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&s)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DomainError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
