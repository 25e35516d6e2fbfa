//! Calibration cell table
//!
//! Holds every cell that has been loaded from the calibration cache or
//! written at runtime. Cells that were never written resolve to the picture
//! mode's configured default, then to a fixed built-in default.

use std::collections::HashMap;
use tvpq_config::{CalibrationSnapshot, ModeConfig};
use tvpq_hal::{
    CellKey, CellValue, ColorTemperature, ComponentColor, ComponentTunnel, Control, GammaTable,
    PqParameter, RgbChannel, WbControl,
};

use crate::ranges;

pub const DEFAULT_WB_GAIN: i32 = 1024;
pub const DEFAULT_WB_OFFSET: i32 = 0;
pub const DEFAULT_CMS_LUMA: i32 = 15;
pub const DEFAULT_CMS_HUE: i32 = 50;
pub const DEFAULT_CMS_SATURATION: i32 = 50;

/// Default of a CMS tunnel; the state tunnel has none
pub fn cms_default(tunnel: ComponentTunnel) -> Option<i32> {
    match tunnel {
        ComponentTunnel::Luma => Some(DEFAULT_CMS_LUMA),
        ComponentTunnel::Hue => Some(DEFAULT_CMS_HUE),
        ComponentTunnel::Saturation => Some(DEFAULT_CMS_SATURATION),
        ComponentTunnel::State => None,
    }
}

/// Built-in default used when neither the table nor the mode config has a value
pub fn static_default(control: &Control) -> CellValue {
    match control {
        Control::Pq { parameter } => CellValue::Int(match parameter {
            PqParameter::Backlight
            | PqParameter::Brightness
            | PqParameter::Contrast
            | PqParameter::Sharpness
            | PqParameter::Saturation
            | PqParameter::Hue
            | PqParameter::Tint => 50,
            _ => 0,
        }),
        Control::WhiteBalance { control, .. } => CellValue::Int(match control {
            WbControl::Gain => DEFAULT_WB_GAIN,
            WbControl::Offset => DEFAULT_WB_OFFSET,
        }),
        Control::Cms { tunnel, .. } => CellValue::Int(cms_default(*tunnel).unwrap_or(0)),
        Control::GammaTable => CellValue::Gamma(GammaTable::linear()),
    }
}

/// Default for a cell: the mode's configured value, else the built-in one
pub fn default_value(key: &CellKey, config: &ModeConfig) -> CellValue {
    if let Control::Pq { parameter } = key.control {
        let configured = config
            .read_defaults(key.pq_mode)
            .and_then(|defaults| defaults.get(&parameter).copied());
        if let Some(value) = configured {
            return CellValue::Int(value);
        }
    }
    static_default(&key.control)
}

/// Every addressable control, in a stable order
pub fn all_controls() -> Vec<Control> {
    let mut controls: Vec<Control> = PqParameter::ALL.into_iter().map(Control::pq).collect();

    for temperature in ColorTemperature::ALL {
        for channel in RgbChannel::ALL {
            for control in [WbControl::Gain, WbControl::Offset] {
                controls.push(Control::WhiteBalance {
                    temperature,
                    channel,
                    control,
                });
            }
        }
    }

    for color in ComponentColor::ALL {
        for tunnel in ComponentTunnel::ALL {
            controls.push(Control::Cms { color, tunnel });
        }
    }

    controls.push(Control::GammaTable);
    controls
}

/// In-memory calibration cells
#[derive(Debug, Default)]
pub struct CellTable {
    cells: HashMap<CellKey, CellValue>,
}

impl CellTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from a loaded calibration snapshot, dropping cells whose
    /// value has the wrong shape or lies outside the control's range
    pub fn from_snapshot(snapshot: &CalibrationSnapshot, config: &ModeConfig) -> Self {
        let mut cells = HashMap::with_capacity(snapshot.cells.len());
        for (key, value) in &snapshot.cells {
            match ranges::validate_stored(&key.control, value, config) {
                Ok(()) => {
                    cells.insert(*key, value.clone());
                }
                Err(err) => tracing::warn!("Skipping cached cell {}: {}", key, err),
            }
        }
        Self { cells }
    }

    pub fn get(&self, key: &CellKey) -> Option<&CellValue> {
        self.cells.get(key)
    }

    pub fn insert(&mut self, key: CellKey, value: CellValue) -> Option<CellValue> {
        self.cells.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Stored value, falling back to the derived default
    pub fn resolve(&self, key: &CellKey, config: &ModeConfig) -> CellValue {
        match self.cells.get(key) {
            Some(value) => value.clone(),
            None => default_value(key, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvpq_hal::{HdrType, SourceInput};

    fn key(pq_mode: u8, control: Control) -> CellKey {
        CellKey::new(SourceInput::Hdmi, pq_mode, HdrType::Sdr, control)
    }

    #[test]
    fn test_static_defaults() {
        assert_eq!(
            static_default(&Control::pq(PqParameter::Contrast)),
            CellValue::Int(50)
        );
        assert_eq!(
            static_default(&Control::pq(PqParameter::LowLatency)),
            CellValue::Int(0)
        );
        assert_eq!(
            static_default(&Control::WhiteBalance {
                temperature: ColorTemperature::User,
                channel: RgbChannel::Green,
                control: WbControl::Gain,
            }),
            CellValue::Int(1024)
        );
        assert_eq!(
            static_default(&Control::GammaTable),
            CellValue::Gamma(GammaTable::linear())
        );
    }

    #[test]
    fn test_cms_defaults() {
        assert_eq!(cms_default(ComponentTunnel::Luma), Some(15));
        assert_eq!(cms_default(ComponentTunnel::Hue), Some(50));
        assert_eq!(cms_default(ComponentTunnel::Saturation), Some(50));
        assert_eq!(cms_default(ComponentTunnel::State), None);
    }

    #[test]
    fn test_mode_defaults_take_precedence() {
        let config = ModeConfig::reference();
        let backlight = Control::pq(PqParameter::Backlight);

        // Dynamic
        assert_eq!(default_value(&key(1, backlight), &config), CellValue::Int(100));
        // Unknown mode falls through to the built-in default
        assert_eq!(default_value(&key(8, backlight), &config), CellValue::Int(50));
    }

    #[test]
    fn test_resolve_prefers_stored_cell() {
        let config = ModeConfig::reference();
        let backlight = Control::pq(PqParameter::Backlight);
        let mut table = CellTable::new();
        assert!(table.is_empty());

        assert_eq!(table.resolve(&key(1, backlight), &config), CellValue::Int(100));
        table.insert(key(1, backlight), CellValue::Int(35));
        assert_eq!(table.resolve(&key(1, backlight), &config), CellValue::Int(35));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_from_snapshot() {
        let snapshot = CalibrationSnapshot {
            cells: vec![(key(0, Control::pq(PqParameter::Hue)), CellValue::Int(12))],
            selections: Vec::new(),
        };
        let table = CellTable::from_snapshot(&snapshot, &ModeConfig::reference());
        assert_eq!(
            table.get(&key(0, Control::pq(PqParameter::Hue))),
            Some(&CellValue::Int(12))
        );
    }

    #[test]
    fn test_from_snapshot_drops_invalid_cells() {
        let backlight = key(0, Control::pq(PqParameter::Backlight));
        let contrast = key(0, Control::pq(PqParameter::Contrast));
        let gamma = key(0, Control::GammaTable);
        let snapshot = CalibrationSnapshot {
            cells: vec![
                (backlight, CellValue::Int(9999)),
                (contrast, CellValue::Gamma(GammaTable::linear())),
                (gamma, CellValue::Int(7)),
                (key(0, Control::pq(PqParameter::Hue)), CellValue::Int(12)),
            ],
            selections: Vec::new(),
        };

        let config = ModeConfig::reference();
        let table = CellTable::from_snapshot(&snapshot, &config);
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve(&backlight, &config), CellValue::Int(70));
        assert_eq!(table.resolve(&contrast, &config), CellValue::Int(50));
        assert_eq!(
            table.resolve(&gamma, &config),
            CellValue::Gamma(GammaTable::linear())
        );
    }

    #[test]
    fn test_all_controls() {
        let controls = all_controls();
        assert_eq!(controls.len(), 15 + 24 + 24 + 1);
        assert_eq!(controls.last(), Some(&Control::GammaTable));
    }
}
