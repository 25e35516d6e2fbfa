//! Picture settings store for TV picture-quality calibration
//!
//! Keeps calibrated values for every (source, picture mode, video format,
//! control) combination, validates them against their ranges, applies them
//! to the platform driver and writes saved values through to the
//! calibration cache.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tvpq_config::StoreConfig;
//! use tvpq_hal::mock::MockDriver;
//! use tvpq_hal::{HdrType, PqParameter, SourceInput};
//! use tvpq_settings::PictureSettingsStore;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = StoreConfig::load_default()?;
//!     let store = PictureSettingsStore::open(settings, Arc::new(MockDriver::from_env()))?;
//!
//!     store.set(PqParameter::Backlight, 80)?;
//!     store.save(PqParameter::Contrast, SourceInput::All, 0, HdrType::Sdr, 55)?;
//!     println!("Backlight: {}", store.get(PqParameter::Backlight)?);
//!     Ok(())
//! }
//! ```

pub mod cells;
pub mod ranges;
mod store;

pub use ranges::ValueRange;
pub use store::{PictureSettingsStore, StoreState};
