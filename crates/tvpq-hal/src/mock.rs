//! Mock driver for testing without real TV hardware
//!
//! [`MockDriver`] records every applied value in shared state so tests can
//! inspect what reached "hardware", and can be told to fail, to stall, or to
//! report a different playback context.
//!
//! # Usage
//!
//! ```no_run
//! use tvpq_hal::mock::{MockDriver, MockPlatform};
//! use tvpq_hal::{HdrType, SourceInput};
//!
//! // Reference platform: every control implemented
//! let driver = MockDriver::new(MockPlatform::Reference);
//! driver.set_playback(SourceInput::Tv, HdrType::Hdr10);
//!
//! // Or pick the platform from TVPQ_MOCK_PLATFORM
//! let from_env = MockDriver::from_env();
//! ```

use crate::driver::{DriverSink, PlaybackContext};
use crate::types::{CellValue, Control, HdrType, PqParameter, SourceInput};
use crate::{Result, TvError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

/// Pre-defined mock platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockPlatform {
    /// Every control implemented
    Reference,
    /// Entry-level LCD SoC: no local dimming, no Dolby Vision, no low latency
    Basic,
    /// OLED panel: self-emissive, so no backlight or dimming controls
    Oled,
}

impl MockPlatform {
    /// Controls this platform does not implement
    pub fn unsupported(self) -> Vec<Control> {
        let params: &[PqParameter] = match self {
            MockPlatform::Reference => &[],
            MockPlatform::Basic => &[
                PqParameter::DimmingMode,
                PqParameter::DimmingLevel,
                PqParameter::DolbyVisionMode,
                PqParameter::LowLatency,
            ],
            MockPlatform::Oled => &[
                PqParameter::Backlight,
                PqParameter::DimmingMode,
                PqParameter::DimmingLevel,
            ],
        };

        params.iter().map(|p| Control::pq(*p)).collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MockPlatform::Reference => "reference",
            MockPlatform::Basic => "basic",
            MockPlatform::Oled => "oled",
        }
    }

    /// Get platform from string name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "reference" | "ref" => Some(MockPlatform::Reference),
            "basic" | "lcd" => Some(MockPlatform::Basic),
            "oled" => Some(MockPlatform::Oled),
            _ => None,
        }
    }

    /// List all available mock platforms
    pub fn all() -> &'static [MockPlatform] {
        &[MockPlatform::Reference, MockPlatform::Basic, MockPlatform::Oled]
    }
}

/// Shared mock state for synchronized access
#[derive(Debug)]
pub struct MockState {
    /// Last value applied per control
    pub applied: HashMap<Control, CellValue>,
    /// Every apply, in order
    pub history: Vec<(Control, CellValue)>,
    /// Reported playback context
    pub playback: PlaybackContext,
    /// Controls reported as unsupported
    pub unsupported: HashSet<Control>,
    /// Reject every apply with a General error
    pub fail_applies: bool,
    /// Controls whose apply is rejected
    pub failing_controls: HashSet<Control>,
    /// Simulated hardware latency per apply
    pub apply_delay: Duration,
}

impl MockState {
    pub fn new(platform: MockPlatform) -> Self {
        Self {
            applied: HashMap::new(),
            history: Vec::new(),
            playback: PlaybackContext::default(),
            unsupported: platform.unsupported().into_iter().collect(),
            fail_applies: false,
            failing_controls: HashSet::new(),
            apply_delay: Duration::ZERO,
        }
    }
}

impl Default for MockState {
    fn default() -> Self {
        Self::new(MockPlatform::Reference)
    }
}

/// Mock driver; clones share the same state
#[derive(Clone)]
pub struct MockDriver {
    name: String,
    platform: MockPlatform,
    state: Arc<RwLock<MockState>>,
}

impl MockDriver {
    /// Create a new mock driver for the given platform
    pub fn new(platform: MockPlatform) -> Self {
        Self {
            name: format!("mock-{}", platform.as_str()),
            platform,
            state: Arc::new(RwLock::new(MockState::new(platform))),
        }
    }

    /// Create from environment variable or default to Reference
    pub fn from_env() -> Self {
        let platform = std::env::var("TVPQ_MOCK_PLATFORM")
            .ok()
            .and_then(|s| MockPlatform::from_name(&s))
            .unwrap_or(MockPlatform::Reference);

        Self::new(platform)
    }

    pub fn platform(&self) -> MockPlatform {
        self.platform
    }

    /// Get shared state for manipulation in tests
    pub fn state(&self) -> Arc<RwLock<MockState>> {
        Arc::clone(&self.state)
    }

    /// Simulate a source switch or format change
    pub fn set_playback(&self, source: SourceInput, hdr_type: HdrType) {
        if let Ok(mut state) = self.state.write() {
            state.playback = PlaybackContext { source, hdr_type };
        }
    }

    /// Make every subsequent apply fail
    pub fn fail_applies(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_applies = fail;
        }
    }

    /// Make applies of one control fail
    pub fn fail_control(&self, control: Control) {
        if let Ok(mut state) = self.state.write() {
            state.failing_controls.insert(control);
        }
    }

    /// Simulate slow hardware
    pub fn set_apply_delay(&self, delay: Duration) {
        if let Ok(mut state) = self.state.write() {
            state.apply_delay = delay;
        }
    }

    /// Last value applied to `control`
    pub fn applied(&self, control: &Control) -> Option<CellValue> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.applied.get(control).cloned())
    }

    /// Number of applies seen so far
    pub fn apply_count(&self) -> usize {
        self.state.read().map(|s| s.history.len()).unwrap_or(0)
    }

    /// Forget recorded applies
    pub fn clear_history(&self) {
        if let Ok(mut state) = self.state.write() {
            state.applied.clear();
            state.history.clear();
        }
    }
}

impl DriverSink for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, control: &Control, value: &CellValue) -> Result<()> {
        let delay = self
            .state
            .read()
            .map(|s| s.apply_delay)
            .unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| TvError::General("mock state poisoned".into()))?;

        if state.unsupported.contains(control) {
            return Err(TvError::OperationNotSupported(control.node_name()));
        }
        if state.fail_applies || state.failing_controls.contains(control) {
            tracing::debug!("[MOCK] Rejecting {} = {}", control, value);
            return Err(TvError::General(format!("mock rejected {}", control)));
        }

        state.applied.insert(*control, value.clone());
        state.history.push((*control, value.clone()));
        tracing::debug!("[MOCK] {} set to {}", control, value);
        Ok(())
    }

    fn playback(&self) -> Result<PlaybackContext> {
        self.state
            .read()
            .map(|s| s.playback)
            .map_err(|_| TvError::General("mock state poisoned".into()))
    }

    fn supports(&self, control: &Control) -> bool {
        self.state
            .read()
            .map(|s| !s.unsupported.contains(control))
            .unwrap_or(false)
    }
}
