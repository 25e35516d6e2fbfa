//! Picture-quality Hardware Abstraction Layer (HAL)
//!
//! This crate defines the contract between the picture settings store and the
//! SoC-specific driver stack of a TV platform: the domain types used to
//! address calibration cells, the [`DriverSink`] trait vendors implement, the
//! notification bus that carries video-pipeline events, and the flat error
//! taxonomy every operation reports through.
//!
//! # Drivers
//!
//! - [`sysfs::SysfsDriver`]: writes controls to sysfs-style nodes
//! - [`mock::MockDriver`]: in-memory driver for tests and desktop development
//!
//! # Example
//!
//! ```no_run
//! use tvpq_hal::{Control, DriverSink, PqParameter, CellValue};
//! use tvpq_hal::mock::{MockDriver, MockPlatform};
//!
//! fn main() -> anyhow::Result<()> {
//!     let driver = MockDriver::new(MockPlatform::Reference);
//!     driver.apply(&Control::pq(PqParameter::Backlight), &CellValue::Int(80))?;
//!     println!("Playing: {:?}", driver.playback()?);
//!     Ok(())
//! }
//! ```

pub mod driver;
pub mod events;
pub mod mock;
pub mod sysfs;
pub mod types;

pub use driver::{DriverSink, DriverWorker, PlaybackContext};
pub use events::{
    ContentType, EventKind, EventPublisher, FrameRate, NotificationBus, VideoEvent,
    VideoResolution,
};
pub use types::{
    CellKey, CellValue, CmsState, ColorTemperature, ComponentColor, ComponentTunnel, Control,
    DimmingMode, GAMMA_TABLE_SIZE, GammaTable, HdrType, PICTURE_MODE_INDEX_LIMIT,
    PICTURE_MODE_MAX, PqParameter, RgbChannel, SourceInput, WbControl,
};

use thiserror::Error;

/// Error taxonomy shared by every picture-quality operation
#[derive(Debug, Error)]
pub enum TvError {
    #[error("General failure: {0}")]
    General(String),

    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat classification of a [`TvError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    General,
    OperationNotSupported,
    InvalidParam,
    InvalidState,
}

/// C-compatible code for a successful call
pub const ERROR_NONE: i32 = 0;

impl TvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TvError::General(_) | TvError::Io(_) => ErrorKind::General,
            TvError::OperationNotSupported(_) => ErrorKind::OperationNotSupported,
            TvError::InvalidParam(_) => ErrorKind::InvalidParam,
            TvError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// C-compatible error code
    pub fn code(&self) -> i32 {
        match self.kind() {
            ErrorKind::General => 1,
            ErrorKind::OperationNotSupported => 2,
            ErrorKind::InvalidParam => 3,
            ErrorKind::InvalidState => 4,
        }
    }
}

/// Collapse a result into its C-compatible error code
pub fn error_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => ERROR_NONE,
        Err(e) => e.code(),
    }
}

/// HAL Result type
pub type Result<T> = std::result::Result<T, TvError>;
