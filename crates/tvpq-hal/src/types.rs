//! Picture-quality domain types
//!
//! Sources, HDR formats and picture controls, plus the calibration cell
//! key/value shapes shared by drivers, the config reader and the settings
//! store.

use crate::TvError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel returned when a picture mode name is not configured
pub const PICTURE_MODE_MAX: u8 = 0xFF;

/// Highest index a configured picture mode may use
pub const PICTURE_MODE_INDEX_LIMIT: u8 = 9;

/// Entries per gamma channel
pub const GAMMA_TABLE_SIZE: usize = 256;

/// Video input a setting applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceInput {
    /// Every known source (raw value -1)
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "HDMI")]
    Hdmi,
    #[serde(rename = "TV")]
    Tv,
    #[serde(rename = "AV")]
    Av,
}

impl SourceInput {
    /// Concrete sources, in raw-id order
    pub const CONCRETE: [SourceInput; 3] = [SourceInput::Hdmi, SourceInput::Tv, SourceInput::Av];

    /// Raw source id as used by the C contract
    pub fn raw(self) -> i32 {
        match self {
            SourceInput::All => -1,
            SourceInput::Hdmi => 0,
            SourceInput::Tv => 1,
            SourceInput::Av => 2,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(SourceInput::All),
            0 => Some(SourceInput::Hdmi),
            1 => Some(SourceInput::Tv),
            2 => Some(SourceInput::Av),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceInput::All => "ALL",
            SourceInput::Hdmi => "HDMI",
            SourceInput::Tv => "TV",
            SourceInput::Av => "AV",
        }
    }

    /// Parse a source name (exact match)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ALL" => Some(SourceInput::All),
            "HDMI" => Some(SourceInput::Hdmi),
            "TV" => Some(SourceInput::Tv),
            "AV" => Some(SourceInput::Av),
            _ => None,
        }
    }

    pub fn is_all(self) -> bool {
        self == SourceInput::All
    }
}

impl fmt::Display for SourceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dynamic range classification of the playing video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HdrType {
    None,
    Hdr10,
    Hdr10Plus,
    Dovi,
    PrimeSl,
    Hlg,
    Sdr,
    Mvc,
}

impl HdrType {
    pub const ALL: [HdrType; 8] = [
        HdrType::None,
        HdrType::Hdr10,
        HdrType::Hdr10Plus,
        HdrType::Dovi,
        HdrType::PrimeSl,
        HdrType::Hlg,
        HdrType::Sdr,
        HdrType::Mvc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HdrType::None => "NONE",
            HdrType::Hdr10 => "HDR10",
            HdrType::Hdr10Plus => "HDR10PLUS",
            HdrType::Dovi => "DOVI",
            HdrType::PrimeSl => "PRIMESL",
            HdrType::Hlg => "HLG",
            HdrType::Sdr => "SDR",
            HdrType::Mvc => "MVC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        HdrType::ALL.into_iter().find(|t| t.as_str() == s.trim())
    }
}

impl fmt::Display for HdrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// White point preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTemperature {
    Standard,
    Warm,
    Cold,
    User,
}

impl ColorTemperature {
    pub const ALL: [ColorTemperature; 4] = [
        ColorTemperature::Standard,
        ColorTemperature::Warm,
        ColorTemperature::Cold,
        ColorTemperature::User,
    ];

    pub fn raw(self) -> i32 {
        match self {
            ColorTemperature::Standard => 0,
            ColorTemperature::Warm => 1,
            ColorTemperature::Cold => 2,
            ColorTemperature::User => 3,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        ColorTemperature::ALL.into_iter().find(|t| t.raw() == raw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorTemperature::Standard => "standard",
            ColorTemperature::Warm => "warm",
            ColorTemperature::Cold => "cold",
            ColorTemperature::User => "user",
        }
    }

    /// Parse the white-balance menu vocabulary (custom, normal, cool, warm)
    pub fn from_wb_name(s: &str) -> Option<Self> {
        match s {
            "custom" => Some(ColorTemperature::User),
            "normal" => Some(ColorTemperature::Standard),
            "cool" => Some(ColorTemperature::Cold),
            "warm" => Some(ColorTemperature::Warm),
            _ => None,
        }
    }
}

/// Primary channel of a white-balance cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RgbChannel {
    Red,
    Green,
    Blue,
}

impl RgbChannel {
    pub const ALL: [RgbChannel; 3] = [RgbChannel::Red, RgbChannel::Green, RgbChannel::Blue];

    pub fn as_str(self) -> &'static str {
        match self {
            RgbChannel::Red => "red",
            RgbChannel::Green => "green",
            RgbChannel::Blue => "blue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        RgbChannel::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// Which half of a white-balance channel is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WbControl {
    Gain,
    /// Post-offset
    Offset,
}

impl WbControl {
    pub fn as_str(self) -> &'static str {
        match self {
            WbControl::Gain => "gain",
            WbControl::Offset => "offset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gain" => Some(WbControl::Gain),
            "offset" => Some(WbControl::Offset),
            _ => None,
        }
    }
}

/// Backlight control strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimmingMode {
    Fixed,
    Local,
    Global,
}

impl DimmingMode {
    pub fn raw(self) -> i32 {
        match self {
            DimmingMode::Fixed => 0,
            DimmingMode::Local => 1,
            DimmingMode::Global => 2,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(DimmingMode::Fixed),
            1 => Some(DimmingMode::Local),
            2 => Some(DimmingMode::Global),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "fixed" => Some(DimmingMode::Fixed),
            "local" => Some(DimmingMode::Local),
            "global" => Some(DimmingMode::Global),
            _ => None,
        }
    }
}

/// Named picture-quality control with a scalar value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PqParameter {
    Backlight,
    Brightness,
    Contrast,
    Sharpness,
    Saturation,
    Hue,
    Tint,
    ColorTemperature,
    DimmingMode,
    DimmingLevel,
    LowLatency,
    DynamicContrast,
    DolbyVisionMode,
    Hdr10Mode,
    HlgMode,
}

impl PqParameter {
    pub const ALL: [PqParameter; 15] = [
        PqParameter::Backlight,
        PqParameter::Brightness,
        PqParameter::Contrast,
        PqParameter::Sharpness,
        PqParameter::Saturation,
        PqParameter::Hue,
        PqParameter::Tint,
        PqParameter::ColorTemperature,
        PqParameter::DimmingMode,
        PqParameter::DimmingLevel,
        PqParameter::LowLatency,
        PqParameter::DynamicContrast,
        PqParameter::DolbyVisionMode,
        PqParameter::Hdr10Mode,
        PqParameter::HlgMode,
    ];

    /// Config section / sysfs node name
    pub fn as_str(self) -> &'static str {
        match self {
            PqParameter::Backlight => "backlight",
            PqParameter::Brightness => "brightness",
            PqParameter::Contrast => "contrast",
            PqParameter::Sharpness => "sharpness",
            PqParameter::Saturation => "saturation",
            PqParameter::Hue => "hue",
            PqParameter::Tint => "tint",
            PqParameter::ColorTemperature => "color_temperature",
            PqParameter::DimmingMode => "dimming_mode",
            PqParameter::DimmingLevel => "dimming_level",
            PqParameter::LowLatency => "low_latency",
            PqParameter::DynamicContrast => "dynamic_contrast",
            PqParameter::DolbyVisionMode => "dolby_vision_mode",
            PqParameter::Hdr10Mode => "hdr10_mode",
            PqParameter::HlgMode => "hlg_mode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        PqParameter::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Parameters whose range comes from a configured mode list
    pub fn is_mode_list(self) -> bool {
        matches!(
            self,
            PqParameter::DolbyVisionMode | PqParameter::Hdr10Mode | PqParameter::HlgMode
        )
    }
}

impl fmt::Display for PqParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CMS component color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentColor {
    Red,
    Green,
    Blue,
    Cyan,
    Magenta,
    Yellow,
}

impl ComponentColor {
    pub const ALL: [ComponentColor; 6] = [
        ComponentColor::Red,
        ComponentColor::Green,
        ComponentColor::Blue,
        ComponentColor::Cyan,
        ComponentColor::Magenta,
        ComponentColor::Yellow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentColor::Red => "red",
            ComponentColor::Green => "green",
            ComponentColor::Blue => "blue",
            ComponentColor::Cyan => "cyan",
            ComponentColor::Magenta => "magenta",
            ComponentColor::Yellow => "yellow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ComponentColor::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// CMS tunnel (which property of a component color is tuned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentTunnel {
    State,
    Hue,
    Saturation,
    Luma,
}

impl ComponentTunnel {
    pub const ALL: [ComponentTunnel; 4] = [
        ComponentTunnel::State,
        ComponentTunnel::Hue,
        ComponentTunnel::Saturation,
        ComponentTunnel::Luma,
    ];

    pub fn raw(self) -> i32 {
        match self {
            ComponentTunnel::State => 0,
            ComponentTunnel::Hue => 1,
            ComponentTunnel::Saturation => 2,
            ComponentTunnel::Luma => 3,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        ComponentTunnel::ALL.into_iter().find(|t| t.raw() == raw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentTunnel::State => "state",
            ComponentTunnel::Hue => "hue",
            ComponentTunnel::Saturation => "saturation",
            ComponentTunnel::Luma => "luma",
        }
    }
}

/// Value written to the CMS state tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmsState {
    Disabled,
    Enabled,
    Reset,
}

impl CmsState {
    pub fn raw(self) -> i32 {
        match self {
            CmsState::Disabled => 0,
            CmsState::Enabled => 1,
            CmsState::Reset => 2,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(CmsState::Disabled),
            1 => Some(CmsState::Enabled),
            2 => Some(CmsState::Reset),
            _ => None,
        }
    }
}

/// Addressable control within a calibration bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    Pq {
        parameter: PqParameter,
    },
    WhiteBalance {
        temperature: ColorTemperature,
        channel: RgbChannel,
        control: WbControl,
    },
    Cms {
        color: ComponentColor,
        tunnel: ComponentTunnel,
    },
    GammaTable,
}

impl Control {
    pub fn pq(parameter: PqParameter) -> Self {
        Control::Pq { parameter }
    }

    /// Stable node name (sysfs node, log field)
    pub fn node_name(&self) -> String {
        match self {
            Control::Pq { parameter } => parameter.as_str().to_string(),
            Control::WhiteBalance {
                temperature,
                channel,
                control,
            } => format!(
                "wb_{}_{}_{}",
                temperature.as_str(),
                channel.as_str(),
                control.as_str()
            ),
            Control::Cms { color, tunnel } => {
                format!("cms_{}_{}", color.as_str(), tunnel.as_str())
            }
            Control::GammaTable => "gamma_table".to_string(),
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.node_name())
    }
}

/// 256-entry per-channel gamma curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GammaTable {
    pub red: Vec<u16>,
    pub green: Vec<u16>,
    pub blue: Vec<u16>,
}

impl GammaTable {
    /// Build a table, rejecting channels that are not exactly 256 entries
    pub fn new(red: &[u16], green: &[u16], blue: &[u16]) -> Result<Self, TvError> {
        for (name, channel) in [("red", red), ("green", green), ("blue", blue)] {
            if channel.len() != GAMMA_TABLE_SIZE {
                return Err(TvError::InvalidParam(format!(
                    "gamma {} channel has {} entries, expected {}",
                    name,
                    channel.len(),
                    GAMMA_TABLE_SIZE
                )));
            }
        }

        Ok(Self {
            red: red.to_vec(),
            green: green.to_vec(),
            blue: blue.to_vec(),
        })
    }

    /// Identity ramp spanning 0..=65535
    pub fn linear() -> Self {
        let ramp: Vec<u16> = (0..GAMMA_TABLE_SIZE as u32).map(|i| (i * 257) as u16).collect();
        Self {
            red: ramp.clone(),
            green: ramp.clone(),
            blue: ramp,
        }
    }

    /// True when every channel has exactly 256 entries
    pub fn is_well_formed(&self) -> bool {
        self.red.len() == GAMMA_TABLE_SIZE
            && self.green.len() == GAMMA_TABLE_SIZE
            && self.blue.len() == GAMMA_TABLE_SIZE
    }
}

impl Default for GammaTable {
    fn default() -> Self {
        Self::linear()
    }
}

/// Value held by a calibration cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValue {
    Int(i32),
    Gamma(GammaTable),
}

impl CellValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Gamma(_) => None,
        }
    }

    pub fn as_gamma(&self) -> Option<&GammaTable> {
        match self {
            CellValue::Gamma(table) => Some(table),
            CellValue::Int(_) => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Gamma(_) => f.write_str("<gamma table>"),
        }
    }
}

/// Address of one calibration cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    /// Always a concrete source, never `SourceInput::All`
    pub source: SourceInput,
    pub pq_mode: u8,
    pub hdr_type: HdrType,
    pub control: Control,
}

impl CellKey {
    pub fn new(source: SourceInput, pq_mode: u8, hdr_type: HdrType, control: Control) -> Self {
        Self {
            source,
            pq_mode,
            hdr_type,
            control,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.source, self.pq_mode, self.hdr_type, self.control
        )
    }
}
