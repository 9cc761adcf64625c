//! JIT configuration: optimization level and diagnostics, loaded from
//! ~/.jit-expr/config.yaml or an explicit path.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Cranelift optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value of the `opt_level` Cranelift setting.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitConfig {
    #[serde(default)]
    pub opt_level: OptLevel,
    /// Run the IR verifier before compiling.
    #[serde(default = "JitConfig::default_verify")]
    pub verify: bool,
    /// Keep the textual IR on each compiled function.
    #[serde(default)]
    pub keep_ir: bool,
}

impl JitConfig {
    fn default_verify() -> bool {
        true
    }

    /// The standard config path (~/.jit-expr/config.yaml).
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::home_dir()?.join(".jit-expr").join("config.yaml"))
    }

    /// Load config from the standard path.
    /// Returns None if the file doesn't exist or can't be parsed.
    pub fn load_default() -> Option<Self> {
        let content = std::fs::read_to_string(Self::default_path()?).ok()?;
        serde_yaml::from_str(&content).ok()
    }

    pub fn load(path: &Path) -> Result<Self, io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: &Path) -> Result<(), io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self).map_err(io::Error::other)?;
        std::fs::write(path, yaml)
    }
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::default(),
            verify: true,
            keep_ir: false,
        }
    }
}
