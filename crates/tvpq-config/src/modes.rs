//! Picture mode configuration
//!
//! Reads the vendor `allmodes.conf` (TOML): the picture modes with their
//! per-mode default values, the known sources, the Dolby Vision / HDR10 / HLG
//! mode lists and optional capability sections that narrow ranges or mark a
//! control as absent on the platform.
//!
//! ```toml
//! default_mode = "Entertainment"
//! sources = ["HDMI", "TV", "AV"]
//! dolby_modes = ["Dark", "Bright"]
//!
//! [[picture_modes]]
//! name = "Entertainment"
//! index = 0
//! [picture_modes.defaults]
//! backlight = 70
//! contrast = 50
//!
//! [capabilities.backlight]
//! range_from = 0
//! range_to = 100
//! platform_support = true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tvpq_hal::{HdrType, PICTURE_MODE_INDEX_LIMIT, PqParameter, SourceInput};

use crate::ConfigError;

/// One configured picture mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PictureModeEntry {
    /// Display name, matched case-sensitively
    pub name: String,
    /// pq_mode index (0-9)
    pub index: u8,
    /// Default values keyed by parameter name
    #[serde(default)]
    pub defaults: BTreeMap<String, i32>,
}

/// Capability descriptor for one control section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Lowest accepted value (narrows the built-in range)
    pub range_from: Option<i32>,
    /// Highest accepted value (narrows the built-in range)
    pub range_to: Option<i32>,
    /// Control exists on this platform
    #[serde(default = "default_true")]
    pub platform_support: bool,
    /// Sources the control applies to (empty = all)
    #[serde(default)]
    pub sources: Vec<SourceInput>,
    /// Video formats the control applies to (empty = all)
    #[serde(default)]
    pub formats: Vec<HdrType>,
}

fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<SourceInput> {
    SourceInput::CONCRETE.to_vec()
}

impl Capability {
    pub fn allows_source(&self, source: SourceInput) -> bool {
        self.sources.is_empty() || self.sources.contains(&source)
    }

    pub fn allows_format(&self, hdr_type: HdrType) -> bool {
        self.formats.is_empty() || self.formats.contains(&hdr_type)
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self {
            range_from: None,
            range_to: None,
            platform_support: true,
            sources: Vec::new(),
            formats: Vec::new(),
        }
    }
}

/// Parsed `allmodes.conf`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Mode selected when nothing was saved for the live source/format
    #[serde(default)]
    pub default_mode: Option<String>,

    /// Concrete sources a save to ALL fans out over
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceInput>,

    #[serde(default)]
    pub picture_modes: Vec<PictureModeEntry>,

    #[serde(default)]
    pub dolby_modes: Vec<String>,

    #[serde(default)]
    pub hdr10_modes: Vec<String>,

    #[serde(default)]
    pub hlg_modes: Vec<String>,

    #[serde(default)]
    pub capabilities: BTreeMap<String, Capability>,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl ModeConfig {
    /// Reference configuration with the six standard presets
    pub fn reference() -> Self {
        let preset = |name: &str, index: u8, values: &[(&str, i32)]| PictureModeEntry {
            name: name.to_string(),
            index,
            defaults: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        };

        Self {
            default_mode: Some("Entertainment".to_string()),
            sources: default_sources(),
            picture_modes: vec![
                preset(
                    "Entertainment",
                    0,
                    &[("backlight", 70), ("contrast", 50), ("saturation", 50)],
                ),
                preset(
                    "Dynamic",
                    1,
                    &[("backlight", 100), ("contrast", 70), ("saturation", 65)],
                ),
                preset(
                    "Expert",
                    2,
                    &[("backlight", 60), ("contrast", 50), ("sharpness", 0)],
                ),
                preset(
                    "Movie",
                    3,
                    &[("backlight", 50), ("contrast", 45), ("color_temperature", 1)],
                ),
                preset("Sports", 4, &[("backlight", 90), ("sharpness", 60)]),
                preset("Graphics", 5, &[("backlight", 80), ("low_latency", 1)]),
            ],
            dolby_modes: vec!["Dark".into(), "Bright".into(), "Game".into()],
            hdr10_modes: vec!["Dark".into(), "Bright".into()],
            hlg_modes: vec!["Dark".into(), "Bright".into()],
            capabilities: BTreeMap::new(),
        }
    }

    /// Load and validate a mode configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(
            "Loaded {} picture modes from {}",
            config.picture_modes.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Mode configuration saved to {}", path.display());
        Ok(())
    }

    /// Check the invariants the store relies on
    #[allow(clippy::collapsible_if)] // Avoid if-let chains for MSRV 1.85 compatibility
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        let mut indices = HashSet::new();

        for mode in &self.picture_modes {
            if mode.index > PICTURE_MODE_INDEX_LIMIT {
                return Err(ConfigError::Invalid(format!(
                    "picture mode '{}' has index {} (max {})",
                    mode.name, mode.index, PICTURE_MODE_INDEX_LIMIT
                )));
            }
            if !names.insert(mode.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate picture mode name '{}'",
                    mode.name
                )));
            }
            if !indices.insert(mode.index) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate picture mode index {}",
                    mode.index
                )));
            }
            for key in mode.defaults.keys() {
                if PqParameter::parse(key).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "unknown parameter '{}' in defaults of '{}'",
                        key, mode.name
                    )));
                }
            }
        }

        if let Some(default_mode) = &self.default_mode {
            if !self.picture_modes.is_empty() && !names.contains(default_mode.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "default_mode '{}' is not a configured picture mode",
                    default_mode
                )));
            }
        }

        if self.sources.iter().any(|s| s.is_all()) {
            return Err(ConfigError::Invalid(
                "sources must list concrete inputs only".to_string(),
            ));
        }

        for (section, capability) in &self.capabilities {
            if let (Some(from), Some(to)) = (capability.range_from, capability.range_to) {
                if from > to {
                    return Err(ConfigError::Invalid(format!(
                        "capability '{}' has range_from {} above range_to {}",
                        section, from, to
                    )));
                }
            }
        }

        Ok(())
    }

    /// Configured picture modes
    pub fn modes(&self) -> &[PictureModeEntry] {
        &self.picture_modes
    }

    /// Exact, case-sensitive name lookup
    pub fn mode_index(&self, name: &str) -> Option<u8> {
        self.picture_modes
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.index)
    }

    pub fn mode_name(&self, index: u8) -> Option<&str> {
        self.picture_modes
            .iter()
            .find(|m| m.index == index)
            .map(|m| m.name.as_str())
    }

    pub fn has_mode(&self, index: u8) -> bool {
        self.picture_modes.iter().any(|m| m.index == index)
    }

    /// Mode used when no selection was saved: `default_mode`, else the first
    pub fn default_mode_index(&self) -> Option<u8> {
        self.default_mode
            .as_deref()
            .and_then(|name| self.mode_index(name))
            .or_else(|| self.picture_modes.first().map(|m| m.index))
    }

    /// Default values of one picture mode, `None` when the mode is unknown
    pub fn read_defaults(&self, pq_mode: u8) -> Option<HashMap<PqParameter, i32>> {
        self.picture_modes
            .iter()
            .find(|m| m.index == pq_mode)
            .map(|m| {
                m.defaults
                    .iter()
                    .filter_map(|(k, v)| PqParameter::parse(k).map(|p| (p, *v)))
                    .collect()
            })
    }

    /// Capability section by name (`backlight`, `white_balance`, ...)
    pub fn read_capabilities(&self, section: &str) -> Option<&Capability> {
        self.capabilities.get(section)
    }

    /// Mode list backing a list-valued parameter
    pub fn mode_list(&self, parameter: PqParameter) -> Option<&[String]> {
        match parameter {
            PqParameter::DolbyVisionMode => Some(self.dolby_modes.as_slice()),
            PqParameter::Hdr10Mode => Some(self.hdr10_modes.as_slice()),
            PqParameter::HlgMode => Some(self.hlg_modes.as_slice()),
            _ => None,
        }
    }
}
