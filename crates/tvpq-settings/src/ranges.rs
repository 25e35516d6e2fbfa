//! Value ranges
//!
//! Every scalar control has a fixed built-in range. A `[capabilities]`
//! section in the mode configuration may narrow it, and list-valued
//! parameters (Dolby Vision / HDR10 / HLG modes) take their range from the
//! length of the configured list.

use std::fmt;
use tvpq_config::{Capability, ModeConfig};
use tvpq_hal::{
    CellValue, ComponentTunnel, Control, GAMMA_TABLE_SIZE, PqParameter, Result, TvError,
    WbControl,
};

/// Inclusive integer range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    pub min: i32,
    pub max: i32,
}

impl ValueRange {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Intersect with a capability's `range_from`/`range_to`
    pub fn narrow(self, capability: &Capability) -> Self {
        let min = capability.range_from.map_or(self.min, |f| f.max(self.min));
        let max = capability.range_to.map_or(self.max, |t| t.min(self.max));
        Self { min, max }
    }

    /// `InvalidParam` unless `value` lies within the range
    pub fn check(&self, control: &Control, value: i32) -> Result<()> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(TvError::InvalidParam(format!(
                "{} = {} outside {}",
                control, value, self
            )))
        }
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

pub const PERCENT_RANGE: ValueRange = ValueRange::new(0, 100);
pub const FLAG_RANGE: ValueRange = ValueRange::new(0, 1);
pub const WB_GAIN_RANGE: ValueRange = ValueRange::new(0, 2047);
pub const WB_OFFSET_RANGE: ValueRange = ValueRange::new(-1024, 1024);
pub const CMS_LUMA_RANGE: ValueRange = ValueRange::new(0, 30);
pub const CMS_STATE_RANGE: ValueRange = ValueRange::new(0, 2);

/// Built-in range of a control, `None` for the gamma table and list-valued
/// parameters
pub fn static_range(control: &Control) -> Option<ValueRange> {
    match control {
        Control::Pq { parameter } => match parameter {
            PqParameter::Backlight
            | PqParameter::Brightness
            | PqParameter::Contrast
            | PqParameter::Sharpness
            | PqParameter::Saturation
            | PqParameter::Hue
            | PqParameter::Tint => Some(PERCENT_RANGE),
            PqParameter::ColorTemperature => Some(ValueRange::new(0, 3)),
            PqParameter::DimmingMode => Some(ValueRange::new(0, 2)),
            PqParameter::DimmingLevel | PqParameter::LowLatency | PqParameter::DynamicContrast => {
                Some(FLAG_RANGE)
            }
            PqParameter::DolbyVisionMode | PqParameter::Hdr10Mode | PqParameter::HlgMode => None,
        },
        Control::WhiteBalance { control, .. } => match control {
            WbControl::Gain => Some(WB_GAIN_RANGE),
            WbControl::Offset => Some(WB_OFFSET_RANGE),
        },
        Control::Cms { tunnel, .. } => match tunnel {
            ComponentTunnel::State => Some(CMS_STATE_RANGE),
            ComponentTunnel::Hue | ComponentTunnel::Saturation => Some(PERCENT_RANGE),
            ComponentTunnel::Luma => Some(CMS_LUMA_RANGE),
        },
        Control::GammaTable => None,
    }
}

/// Name of the `[capabilities.<section>]` entry governing a control
pub fn capability_section(control: &Control) -> &'static str {
    match control {
        Control::Pq { parameter } => parameter.as_str(),
        Control::WhiteBalance { .. } => "white_balance",
        Control::Cms { .. } => "cms",
        Control::GammaTable => "gamma_table",
    }
}

/// Built-in or list-derived range, before any capability narrowing
///
/// Fails with `OperationNotSupported` for a list-valued parameter whose list
/// is empty and with `InvalidParam` for the gamma table, which is not scalar.
pub fn base_range(control: &Control, config: &ModeConfig) -> Result<ValueRange> {
    match control {
        Control::Pq { parameter } if parameter.is_mode_list() => {
            let len = config.mode_list(*parameter).map_or(0, <[String]>::len);
            if len == 0 {
                return Err(TvError::OperationNotSupported(format!(
                    "no {} modes configured",
                    parameter
                )));
            }
            Ok(ValueRange::new(0, len as i32 - 1))
        }
        _ => static_range(control).ok_or_else(|| {
            TvError::InvalidParam(format!("{} has no scalar range", control))
        }),
    }
}

/// Range accepted for `control` under `config`
pub fn effective_range(control: &Control, config: &ModeConfig) -> Result<ValueRange> {
    let base = base_range(control, config)?;
    Ok(match config.read_capabilities(capability_section(control)) {
        Some(capability) => base.narrow(capability),
        None => base,
    })
}

fn check_cell(
    control: &Control,
    value: &CellValue,
    range: impl FnOnce() -> Result<ValueRange>,
) -> Result<()> {
    match (control, value) {
        (Control::GammaTable, CellValue::Gamma(table)) => {
            if table.is_well_formed() {
                Ok(())
            } else {
                Err(TvError::InvalidParam(format!(
                    "gamma table channels must have {} entries",
                    GAMMA_TABLE_SIZE
                )))
            }
        }
        (Control::GammaTable, CellValue::Int(_)) => Err(TvError::InvalidParam(
            "gamma table expects a table value".into(),
        )),
        (_, CellValue::Int(v)) => range()?.check(control, *v),
        (_, CellValue::Gamma(_)) => Err(TvError::InvalidParam(format!(
            "{} expects an integer value",
            control
        ))),
    }
}

/// Shape and range check for a value about to be set or saved
pub fn validate(control: &Control, value: &CellValue, config: &ModeConfig) -> Result<()> {
    check_cell(control, value, || effective_range(control, config))
}

/// Shape and built-in range check for a value read back from the
/// calibration cache
pub fn validate_stored(control: &Control, value: &CellValue, config: &ModeConfig) -> Result<()> {
    check_cell(control, value, || base_range(control, config))
}

/// Reject picture-mode defaults outside their built-in range
///
/// Defaults for a list-valued parameter with no configured list are ignored;
/// the parameter is unsupported there.
pub fn check_mode_defaults(config: &ModeConfig) -> Result<()> {
    for mode in config.modes() {
        let Some(defaults) = config.read_defaults(mode.index) else {
            continue;
        };
        for (parameter, value) in defaults {
            let control = Control::pq(parameter);
            match base_range(&control, config) {
                Ok(range) => range.check(&control, value).map_err(|err| {
                    TvError::General(format!("picture mode {}: {}", mode.name, err))
                })?,
                Err(TvError::OperationNotSupported(_)) => {}
                Err(err) => return Err(err),
            }
        }
    }
    Ok(())
}
