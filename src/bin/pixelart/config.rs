//! Optional TOML config file for the CLI's tunable parameters, so repeated
//! invocations don't need every flag restated. CLI flags always win over a
//! loaded config file (merged in `main.rs`).

use std::path::Path;

use serde::Deserialize;

/// Mirrors [`pixelart_core::EngineParams`], but every field optional so a
/// config file can specify a subset.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub slic_factor: Option<f64>,
    pub sigma_color: Option<f64>,
    pub sigma_pos: Option<f64>,
    pub smooth_pos: Option<f64>,
    pub saturation: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
