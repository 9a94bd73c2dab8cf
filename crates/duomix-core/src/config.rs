//! Console configuration
//!
//! Generic YAML load/save plus the console's own config type. Loading
//! never fails: a missing file yields defaults and a malformed file
//! logs a warning and yields defaults, so a bad edit cannot keep the
//! console from starting.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config. If the file
/// exists but is invalid, logs a warning and returns default config.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("config: {:?} missing, using defaults", path);
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("config: failed to parse {:?}: {}, using defaults", path, e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!("config: failed to read {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;
    Ok(())
}

/// Default config path under the platform config dir
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("duomix")
        .join("console.yaml")
}

/// One generative catalog entry in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub bpm: f64,
    pub program: String,
}

/// Console configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Master volume applied at startup (0..1)
    pub master_volume: f32,
    /// Control tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Generative catalog loaded into the library at startup
    pub catalog: Vec<CatalogEntry>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            master_volume: 0.9,
            tick_interval_ms: 16,
            catalog: default_catalog(),
        }
    }
}

/// Built-in generative catalog used when the config names none
pub fn default_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            name: "Night Drive".to_string(),
            bpm: 124.0,
            program: concat!(
                "stack(note(\"c2*4\").s(\"square\").decay(0.08).lpf(150).gain(0.9), ",
                "note(\"c6*8\").s(\"pink\").hpf(8000).decay(0.02).gain(0.4))"
            )
            .to_string(),
        },
        CatalogEntry {
            name: "Acid Garden".to_string(),
            bpm: 130.0,
            program: "note(\"c2 eb2 g2 c3\").s(\"sawtooth\").lpf(400).decay(0.2).sustain(0.3).gain(0.6)"
                .to_string(),
        },
        CatalogEntry {
            name: "Dust & Echo".to_string(),
            bpm: 90.0,
            program: "note(\"c3 g3\").s(\"triangle\").decay(0.3).sustain(0.4).delay(0.2).gain(0.5)"
                .to_string(),
        },
        CatalogEntry {
            name: "Four Corners".to_string(),
            bpm: 140.0,
            program: concat!(
                "stack(note(\"c2*4\").s(\"square\").decay(0.08).lpf(150), ",
                "note(\"c3\").struct(\"~ x ~ x\").s(\"square\").hpf(400).decay(0.06).gain(0.7))"
            )
            .to_string(),
        },
    ]
}
