//! Sysfs-backed driver
//!
//! Writes each picture control to a node named after it under a sysfs-style
//! directory (for example `/sys/class/tvpq/backlight`) and reads the live
//! playback context from the `source` and `video_format` nodes.

use crate::driver::{DriverSink, PlaybackContext};
use crate::types::{CellValue, Control, HdrType, PqParameter, SourceInput};
use crate::{Result, TvError};
use std::fs;
use std::path::{Path, PathBuf};

/// Sysfs driver configuration
#[derive(Debug, Clone)]
pub struct SysfsConfig {
    pub root: PathBuf,
    /// Fallback when the backlight node has no `max_brightness` sibling
    pub max_brightness: u32,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/sys/class/tvpq"),
            max_brightness: 255,
        }
    }
}

/// Driver writing controls to sysfs nodes
pub struct SysfsDriver {
    root: PathBuf,
    max_brightness: u32,
}

impl SysfsDriver {
    /// Create a new sysfs driver
    pub fn new(config: SysfsConfig) -> Result<Self> {
        if !config.root.is_dir() {
            return Err(TvError::General(format!(
                "sysfs root {} not present",
                config.root.display()
            )));
        }

        let mut driver = Self {
            root: config.root,
            max_brightness: config.max_brightness,
        };
        driver.detect_backlight();

        Ok(driver)
    }

    /// Pick up the panel's real backlight scale
    #[allow(clippy::collapsible_if)] // Avoid if-let chains for MSRV 1.85 compatibility
    fn detect_backlight(&mut self) {
        let max_brightness_path = self.root.join("max_brightness");
        if let Ok(contents) = fs::read_to_string(&max_brightness_path) {
            if let Ok(max) = contents.trim().parse::<u32>() {
                self.max_brightness = max;
                tracing::debug!("Max brightness: {}", max);
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn node(&self, control: &Control) -> PathBuf {
        self.root.join(control.node_name())
    }

    fn read_node(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.root.join(name))?.trim().to_string())
    }

    /// Backlight percentage (0-100) scaled to the panel's max brightness
    fn scale_backlight(&self, level: i32) -> u32 {
        let scaled = level.clamp(0, 100) as u64 * u64::from(self.max_brightness) / 100;
        scaled as u32
    }

    fn render(&self, control: &Control, value: &CellValue) -> String {
        match (control, value) {
            (
                Control::Pq {
                    parameter: PqParameter::Backlight,
                },
                CellValue::Int(level),
            ) => self.scale_backlight(*level).to_string(),
            (_, CellValue::Int(v)) => v.to_string(),
            (_, CellValue::Gamma(table)) => [&table.red, &table.green, &table.blue]
                .iter()
                .map(|channel| {
                    channel
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl DriverSink for SysfsDriver {
    fn name(&self) -> &str {
        "sysfs"
    }

    fn apply(&self, control: &Control, value: &CellValue) -> Result<()> {
        let node = self.node(control);
        if !node.exists() {
            return Err(TvError::OperationNotSupported(format!(
                "no sysfs node {}",
                node.display()
            )));
        }

        let payload = self.render(control, value);
        fs::write(&node, payload).map_err(|e| {
            TvError::General(format!("Failed to write {}: {}", node.display(), e))
        })?;

        tracing::debug!("{} set to {}", control, value);
        Ok(())
    }

    fn playback(&self) -> Result<PlaybackContext> {
        let source_raw = self.read_node("source")?;
        let source = source_raw
            .parse::<i32>()
            .ok()
            .and_then(SourceInput::from_raw)
            .or_else(|| SourceInput::parse(&source_raw))
            .filter(|s| !s.is_all())
            .ok_or_else(|| TvError::General(format!("unknown source '{}'", source_raw)))?;

        let format_raw = self.read_node("video_format")?;
        let hdr_type = HdrType::parse(&format_raw)
            .ok_or_else(|| TvError::General(format!("unknown video format '{}'", format_raw)))?;

        Ok(PlaybackContext { source, hdr_type })
    }

    fn supports(&self, control: &Control) -> bool {
        self.node(control).exists()
    }
}
