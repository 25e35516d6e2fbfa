//! Picture settings store
//!
//! [`PictureSettingsStore`] owns the calibration cells addressed by
//! (source, pq_mode, hdr_type, control). `set_*` operations validate a value,
//! push it to the driver and keep it in memory for the live context only.
//! `save_*` operations persist it through the calibration sink for one source
//! or for every configured source, and apply it when the saved cell is the
//! live one. `get_*` operations read the cell selected by the live playback
//! context reported by the driver.
//!
//! Lifecycle: `Uninitialized -> Ready -> Terminated`. A terminated store
//! cannot be initialized again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tvpq_config::{
    CalibrationFile, CalibrationSink, Capability, ModeConfig, ModeSelection, StoreConfig,
};
use tvpq_hal::{
    CellKey, CellValue, CmsState, ColorTemperature, ComponentColor, ComponentTunnel, Control,
    DriverSink, DriverWorker, GammaTable, HdrType, NotificationBus, PICTURE_MODE_MAX,
    PlaybackContext, PqParameter, Result, RgbChannel, SourceInput, TvError, WbControl,
};

use crate::cells::{self, CellTable};
use crate::ranges::{self, ValueRange};

/// Store lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Ready,
    Terminated,
}

enum Lifecycle {
    Uninitialized,
    Ready(Arc<Session>),
    Terminated,
}

fn poisoned<T>(_: T) -> TvError {
    TvError::General("picture settings lock poisoned".into())
}

fn partial_failure(what: &str, written: usize, total: usize, err: TvError) -> TvError {
    tracing::warn!(
        "Save of {} stopped after {} of {} sources: {}",
        what,
        written,
        total,
        err
    );
    TvError::General(format!(
        "{} saved for {} of {} sources: {}",
        what, written, total, err
    ))
}

/// State that exists only while the store is ready
struct Session {
    config: ModeConfig,
    worker: DriverWorker,
    calibration: Arc<dyn CalibrationSink>,
    cells: RwLock<CellTable>,
    /// Persisted picture mode per source/format
    saved_modes: RwLock<HashMap<(SourceInput, HdrType), u8>>,
    /// Picture mode chosen with `set_picture_mode`, not persisted
    live_modes: RwLock<HashMap<(SourceInput, HdrType), u8>>,
    /// Serializes set/save so driver calls and cell updates stay ordered
    writer: Mutex<()>,
}

impl Session {
    fn playback(&self) -> Result<PlaybackContext> {
        self.worker.playback()
    }

    /// Active picture mode for a source/format pair
    fn mode_for(&self, source: SourceInput, hdr_type: HdrType) -> Result<u8> {
        let pair = (source, hdr_type);
        if let Some(mode) = self.live_modes.read().map_err(poisoned)?.get(&pair) {
            return Ok(*mode);
        }
        if let Some(mode) = self.saved_modes.read().map_err(poisoned)?.get(&pair) {
            return Ok(*mode);
        }
        Ok(self.config.default_mode_index().unwrap_or(0))
    }

    fn key_for(&self, source: SourceInput, hdr_type: HdrType, control: Control) -> Result<CellKey> {
        Ok(CellKey::new(
            source,
            self.mode_for(source, hdr_type)?,
            hdr_type,
            control,
        ))
    }

    /// Platform-wide availability: capability flag, video format, mode list
    fn check_platform(&self, control: &Control, hdr_type: HdrType) -> Result<()> {
        let empty_list = matches!(
            control,
            Control::Pq { parameter } if parameter.is_mode_list()
                && self.config.mode_list(*parameter).is_none_or(|l| l.is_empty())
        );
        if empty_list {
            return Err(TvError::OperationNotSupported(format!(
                "no modes configured for {}",
                control
            )));
        }

        if let Some(capability) = self.config.read_capabilities(ranges::capability_section(control))
        {
            if !capability.platform_support {
                return Err(TvError::OperationNotSupported(format!(
                    "{} not supported on this platform",
                    control
                )));
            }
            if !capability.allows_format(hdr_type) {
                return Err(TvError::OperationNotSupported(format!(
                    "{} not available for {} content",
                    control, hdr_type
                )));
            }
        }
        Ok(())
    }

    fn check_source(&self, control: &Control, source: SourceInput) -> Result<()> {
        let allowed = self
            .config
            .read_capabilities(ranges::capability_section(control))
            .is_none_or(|c| c.allows_source(source));
        if allowed {
            Ok(())
        } else {
            Err(TvError::OperationNotSupported(format!(
                "{} not available on {}",
                control, source
            )))
        }
    }

    fn check_driver(&self, control: &Control) -> Result<()> {
        if self.worker.supports(*control)? {
            Ok(())
        } else {
            Err(TvError::OperationNotSupported(format!(
                "driver {} does not implement {}",
                self.worker.name(),
                control
            )))
        }
    }

    fn check_supported(
        &self,
        control: &Control,
        source: SourceInput,
        hdr_type: HdrType,
    ) -> Result<()> {
        self.check_platform(control, hdr_type)?;
        self.check_source(control, source)?;
        self.check_driver(control)
    }

    fn validate(&self, control: &Control, value: &CellValue) -> Result<()> {
        ranges::validate(control, value, &self.config)
    }

    /// Concrete sources addressed by `source`
    fn concrete_sources(&self, source: SourceInput) -> Result<Vec<SourceInput>> {
        if source.is_all() {
            return Ok(self.config.sources.clone());
        }
        if !self.config.sources.contains(&source) {
            return Err(TvError::InvalidParam(format!(
                "source {} not configured",
                source
            )));
        }
        Ok(vec![source])
    }

    /// Sources a save of `control` fans out to
    fn save_targets(&self, control: &Control, source: SourceInput) -> Result<Vec<SourceInput>> {
        let sources = self.concrete_sources(source)?;
        if !source.is_all() {
            self.check_source(control, source)?;
            return Ok(sources);
        }

        let targets: Vec<SourceInput> = sources
            .into_iter()
            .filter(|s| self.check_source(control, *s).is_ok())
            .collect();
        if targets.is_empty() {
            return Err(TvError::OperationNotSupported(format!(
                "{} not available on any source",
                control
            )));
        }
        Ok(targets)
    }

    fn read(&self, key: &CellKey) -> Result<CellValue> {
        Ok(self
            .cells
            .read()
            .map_err(poisoned)?
            .resolve(key, &self.config))
    }

    fn write(&self, key: CellKey, value: CellValue) -> Result<()> {
        self.cells.write().map_err(poisoned)?.insert(key, value);
        Ok(())
    }

    /// Apply `value` to the live cell `key`, reverting hardware to the
    /// cell's current value when the driver times out after taking it
    fn apply_live(&self, key: &CellKey, value: &CellValue) -> Result<CellValue> {
        let previous = self.read(key)?;
        self.worker
            .apply_or_revert(key.control, value.clone(), previous.clone())?;
        Ok(previous)
    }

    /// Put `previous` back on hardware after a later step failed
    fn restore(&self, key: &CellKey, previous: CellValue) {
        if let Err(err) = self.worker.apply(key.control, previous) {
            tracing::warn!("Failed to restore {} on hardware: {}", key, err);
        }
    }

    /// Apply (when live), persist, then commit one cell
    ///
    /// A failed cache write puts the live cell's previous value back on
    /// hardware, so hardware, memory and cache agree on failure.
    fn persist(&self, key: CellKey, value: &CellValue, live: bool) -> Result<()> {
        let previous = if live {
            Some(self.apply_live(&key, value)?)
        } else {
            None
        };

        if let Err(err) = self.calibration.store_cell(&key, value) {
            if let Some(previous) = previous {
                self.restore(&key, previous);
            }
            return Err(err.into());
        }
        tracing::debug!("Saved {} = {}", key, value);
        self.write(key, value.clone())
    }

    /// Push every cell of `ctx` to the driver, skipping controls the
    /// platform lacks
    fn push_context(&self, ctx: PlaybackContext) -> Result<usize> {
        let mode = self.mode_for(ctx.source, ctx.hdr_type)?;
        let mut applied = 0;

        for control in cells::all_controls() {
            if self.check_platform(&control, ctx.hdr_type).is_err()
                || self.check_source(&control, ctx.source).is_err()
            {
                continue;
            }

            let value = self.read(&CellKey::new(ctx.source, mode, ctx.hdr_type, control))?;
            match self.worker.apply(control, value) {
                Ok(()) => applied += 1,
                Err(TvError::OperationNotSupported(_)) => {
                    tracing::debug!("Skipping {}: not supported by driver", control);
                }
                Err(err) => return Err(err),
            }
        }

        tracing::debug!(
            "Applied {} controls for {}/{}/{}",
            applied,
            ctx.source,
            mode,
            ctx.hdr_type
        );
        Ok(applied)
    }
}

/// Calibrated picture settings for every source, picture mode and video
/// format
pub struct PictureSettingsStore {
    settings: StoreConfig,
    driver: Arc<dyn DriverSink>,
    calibration: Arc<dyn CalibrationSink>,
    lifecycle: RwLock<Lifecycle>,
}

impl PictureSettingsStore {
    /// Create an uninitialized store persisting to `settings.calibration_file`
    pub fn new(settings: StoreConfig, driver: Arc<dyn DriverSink>) -> Self {
        let calibration = Arc::new(CalibrationFile::new(&settings.calibration_file));
        Self::with_calibration(settings, driver, calibration)
    }

    /// Create an uninitialized store with a custom calibration sink
    pub fn with_calibration(
        settings: StoreConfig,
        driver: Arc<dyn DriverSink>,
        calibration: Arc<dyn CalibrationSink>,
    ) -> Self {
        Self {
            settings,
            driver,
            calibration,
            lifecycle: RwLock::new(Lifecycle::Uninitialized),
        }
    }

    /// Create and initialize a store
    pub fn open(settings: StoreConfig, driver: Arc<dyn DriverSink>) -> Result<Self> {
        let store = Self::new(settings, driver);
        store.init()?;
        Ok(store)
    }

    pub fn state(&self) -> StoreState {
        match self.lifecycle.read().as_deref() {
            Ok(Lifecycle::Uninitialized) => StoreState::Uninitialized,
            Ok(Lifecycle::Ready(_)) => StoreState::Ready,
            Ok(Lifecycle::Terminated) | Err(_) => StoreState::Terminated,
        }
    }

    /// Load the mode configuration and calibration cache and start the
    /// driver worker
    pub fn init(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write().map_err(poisoned)?;
        match *lifecycle {
            Lifecycle::Uninitialized => {}
            Lifecycle::Ready(_) => {
                return Err(TvError::InvalidState(
                    "picture settings store already initialized".into(),
                ));
            }
            Lifecycle::Terminated => {
                return Err(TvError::InvalidState(
                    "picture settings store terminated".into(),
                ));
            }
        }

        let config = ModeConfig::load(&self.settings.mode_config)?;
        ranges::check_mode_defaults(&config)?;
        let snapshot = self.calibration.load()?;

        let mut saved_modes = HashMap::new();
        for selection in &snapshot.selections {
            if config.has_mode(selection.pq_mode) {
                saved_modes.insert((selection.source, selection.hdr_type), selection.pq_mode);
            } else {
                tracing::warn!(
                    "Ignoring saved picture mode {} for {}/{}: not configured",
                    selection.pq_mode,
                    selection.source,
                    selection.hdr_type
                );
            }
        }

        let worker = DriverWorker::spawn(Arc::clone(&self.driver), self.settings.driver_timeout())?;
        let cells = CellTable::from_snapshot(&snapshot, &config);

        tracing::info!(
            "Picture settings ready: {} modes, {} calibrated cells, driver {}",
            config.modes().len(),
            cells.len(),
            worker.name()
        );

        *lifecycle = Lifecycle::Ready(Arc::new(Session {
            config,
            worker,
            calibration: Arc::clone(&self.calibration),
            cells: RwLock::new(cells),
            saved_modes: RwLock::new(saved_modes),
            live_modes: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
        }));
        Ok(())
    }

    /// Release the in-memory cells and stop the driver worker
    pub fn term(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write().map_err(poisoned)?;
        match std::mem::replace(&mut *lifecycle, Lifecycle::Terminated) {
            Lifecycle::Ready(session) => {
                session.worker.shutdown();
                tracing::info!("Picture settings terminated");
                Ok(())
            }
            Lifecycle::Uninitialized => {
                *lifecycle = Lifecycle::Uninitialized;
                Err(TvError::InvalidState(
                    "picture settings store not initialized".into(),
                ))
            }
            Lifecycle::Terminated => Err(TvError::InvalidState(
                "picture settings store already terminated".into(),
            )),
        }
    }

    fn session(&self) -> Result<Arc<Session>> {
        match &*self.lifecycle.read().map_err(poisoned)? {
            Lifecycle::Ready(session) => Ok(Arc::clone(session)),
            Lifecycle::Uninitialized => Err(TvError::InvalidState(
                "picture settings store not initialized".into(),
            )),
            Lifecycle::Terminated => Err(TvError::InvalidState(
                "picture settings store terminated".into(),
            )),
        }
    }

    // Generic values

    /// Value of `control` in the live context
    pub fn get_value(&self, control: Control) -> Result<CellValue> {
        let session = self.session()?;
        let ctx = session.playback()?;
        session.check_supported(&control, ctx.source, ctx.hdr_type)?;
        let key = session.key_for(ctx.source, ctx.hdr_type, control)?;
        session.read(&key)
    }

    /// Apply `value` to hardware and keep it for the live context
    pub fn set_value(&self, control: Control, value: CellValue) -> Result<()> {
        let session = self.session()?;
        session.validate(&control, &value)?;

        let _writer = session.writer.lock().map_err(poisoned)?;
        let ctx = session.playback()?;
        session.check_supported(&control, ctx.source, ctx.hdr_type)?;
        let key = session.key_for(ctx.source, ctx.hdr_type, control)?;

        session.apply_live(&key, &value)?;
        tracing::debug!("Set {} = {}", key, value);
        session.write(key, value)
    }

    /// Persist `value` for `source` (or every source), `pq_mode` and
    /// `hdr_type`
    ///
    /// Cells are written one source at a time. When a later source fails the
    /// earlier ones stay written and `General` is returned.
    pub fn save_value(
        &self,
        control: Control,
        source: SourceInput,
        pq_mode: u8,
        hdr_type: HdrType,
        value: CellValue,
    ) -> Result<()> {
        let session = self.session()?;
        session.validate(&control, &value)?;
        if !session.config.has_mode(pq_mode) {
            return Err(TvError::InvalidParam(format!(
                "picture mode {} not configured",
                pq_mode
            )));
        }

        let _writer = session.writer.lock().map_err(poisoned)?;
        session.check_platform(&control, hdr_type)?;
        let targets = session.save_targets(&control, source)?;
        session.check_driver(&control)?;

        let live = session.playback()?;
        let live_mode = session.mode_for(live.source, live.hdr_type)?;

        for (written, target) in targets.iter().enumerate() {
            let key = CellKey::new(*target, pq_mode, hdr_type, control);
            let is_live =
                *target == live.source && hdr_type == live.hdr_type && pq_mode == live_mode;

            if let Err(err) = session.persist(key, &value, is_live) {
                if written == 0 {
                    return Err(err);
                }
                return Err(partial_failure(
                    &control.node_name(),
                    written,
                    targets.len(),
                    err,
                ));
            }
        }
        Ok(())
    }

    /// Stored or default value of one cell, without consulting the driver
    pub fn get_cell(
        &self,
        source: SourceInput,
        pq_mode: u8,
        hdr_type: HdrType,
        control: Control,
    ) -> Result<CellValue> {
        let session = self.session()?;
        if source.is_all() {
            return Err(TvError::InvalidParam(
                "a cell belongs to a single source".into(),
            ));
        }
        session.read(&CellKey::new(source, pq_mode, hdr_type, control))
    }

    fn get_int(&self, control: Control) -> Result<i32> {
        self.get_value(control)?.as_int().ok_or_else(|| {
            TvError::InvalidParam(format!("{} is not an integer control", control))
        })
    }

    pub fn get(&self, parameter: PqParameter) -> Result<i32> {
        self.get_int(Control::pq(parameter))
    }

    pub fn set(&self, parameter: PqParameter, value: i32) -> Result<()> {
        self.set_value(Control::pq(parameter), CellValue::Int(value))
    }

    pub fn save(
        &self,
        parameter: PqParameter,
        source: SourceInput,
        pq_mode: u8,
        hdr_type: HdrType,
        value: i32,
    ) -> Result<()> {
        self.save_value(
            Control::pq(parameter),
            source,
            pq_mode,
            hdr_type,
            CellValue::Int(value),
        )
    }

    // Picture modes

    /// Index of a configured picture mode, `PICTURE_MODE_MAX` when unknown
    pub fn resolve_mode_index(&self, name: &str) -> u8 {
        self.session()
            .ok()
            .and_then(|session| session.config.mode_index(name))
            .unwrap_or(PICTURE_MODE_MAX)
    }

    /// Configured picture modes as (name, index)
    pub fn get_supported_modes(&self) -> Result<Vec<(String, u8)>> {
        let session = self.session()?;
        let modes: Vec<(String, u8)> = session
            .config
            .modes()
            .iter()
            .map(|m| (m.name.clone(), m.index))
            .collect();

        if modes.is_empty() {
            return Err(TvError::General("no picture modes configured".into()));
        }
        Ok(modes)
    }

    /// Name of the picture mode active in the live context
    pub fn get_picture_mode(&self) -> Result<String> {
        let session = self.session()?;
        let ctx = session.playback()?;
        let index = session.mode_for(ctx.source, ctx.hdr_type)?;
        session
            .config
            .mode_name(index)
            .map(str::to_string)
            .ok_or_else(|| TvError::General(format!("active picture mode {} not configured", index)))
    }

    /// Switch the live context to `name` without persisting the choice
    ///
    /// If the driver rejects one of the new mode's cells, the previous mode
    /// is restored and its cells pushed again.
    pub fn set_picture_mode(&self, name: &str) -> Result<()> {
        let session = self.session()?;
        let index = session
            .config
            .mode_index(name)
            .ok_or_else(|| TvError::InvalidParam(format!("unknown picture mode '{}'", name)))?;

        let _writer = session.writer.lock().map_err(poisoned)?;
        let ctx = session.playback()?;
        let pair = (ctx.source, ctx.hdr_type);
        let previous = session
            .live_modes
            .write()
            .map_err(poisoned)?
            .insert(pair, index);

        let applied = match session.push_context(ctx) {
            Ok(applied) => applied,
            Err(err) => {
                tracing::warn!("Switch to picture mode {} failed: {}", name, err);
                {
                    let mut live_modes = session.live_modes.write().map_err(poisoned)?;
                    match previous {
                        Some(mode) => live_modes.insert(pair, mode),
                        None => live_modes.remove(&pair),
                    };
                }
                if let Err(resync) = session.push_context(ctx) {
                    tracing::warn!("Failed to restore previous picture mode: {}", resync);
                }
                return Err(err);
            }
        };
        tracing::info!(
            "Picture mode {} active on {}/{} ({} controls applied)",
            name,
            ctx.source,
            ctx.hdr_type,
            applied
        );
        Ok(())
    }

    /// Persist `name` as the picture mode of `source` (or every source) for
    /// `hdr_type`
    ///
    /// When the live context is among the targets its cells are re-applied;
    /// a driver failure there is logged and does not fail the save.
    #[allow(clippy::collapsible_if)] // Avoid if-let chains for MSRV 1.85 compatibility
    pub fn save_picture_mode(&self, source: SourceInput, hdr_type: HdrType, name: &str) -> Result<()> {
        let session = self.session()?;
        let index = session
            .config
            .mode_index(name)
            .ok_or_else(|| TvError::InvalidParam(format!("unknown picture mode '{}'", name)))?;

        let _writer = session.writer.lock().map_err(poisoned)?;
        let targets = session.concrete_sources(source)?;
        let ctx = session.playback()?;

        for (written, target) in targets.iter().enumerate() {
            let selection = ModeSelection {
                source: *target,
                hdr_type,
                pq_mode: index,
            };
            if let Err(err) = session.calibration.store_selection(selection) {
                if written == 0 {
                    return Err(err.into());
                }
                return Err(partial_failure(
                    "picture mode",
                    written,
                    targets.len(),
                    err.into(),
                ));
            }

            let pair = (*target, hdr_type);
            session
                .saved_modes
                .write()
                .map_err(poisoned)?
                .insert(pair, index);
            session.live_modes.write().map_err(poisoned)?.remove(&pair);
        }
        tracing::info!("Saved picture mode {} for {}/{}", name, source, hdr_type);

        // The selection is stored; a failed re-apply does not undo it
        if targets.contains(&ctx.source) && hdr_type == ctx.hdr_type {
            if let Err(err) = session.push_context(ctx) {
                tracing::warn!("Saved picture mode {} not fully applied: {}", name, err);
            }
        }
        Ok(())
    }

    // White balance

    fn wb(temperature: ColorTemperature, channel: RgbChannel, control: WbControl) -> Control {
        Control::WhiteBalance {
            temperature,
            channel,
            control,
        }
    }

    pub fn get_white_balance(
        &self,
        temperature: ColorTemperature,
        channel: RgbChannel,
        control: WbControl,
    ) -> Result<i32> {
        self.get_int(Self::wb(temperature, channel, control))
    }

    pub fn set_white_balance(
        &self,
        temperature: ColorTemperature,
        channel: RgbChannel,
        control: WbControl,
        value: i32,
    ) -> Result<()> {
        self.set_value(Self::wb(temperature, channel, control), CellValue::Int(value))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn save_white_balance(
        &self,
        source: SourceInput,
        pq_mode: u8,
        hdr_type: HdrType,
        temperature: ColorTemperature,
        channel: RgbChannel,
        control: WbControl,
        value: i32,
    ) -> Result<()> {
        self.save_value(
            Self::wb(temperature, channel, control),
            source,
            pq_mode,
            hdr_type,
            CellValue::Int(value),
        )
    }

    /// Parse the white-balance menu vocabulary: source (HDMI, TV, AV),
    /// temperature (custom, normal, cool, warm), color (red, green, blue)
    /// and control (gain, offset)
    fn parse_wb(
        input_src: &str,
        color_temp: &str,
        color: &str,
        ctrl: &str,
    ) -> Option<(SourceInput, Control)> {
        let source = SourceInput::parse(input_src).filter(|s| !s.is_all())?;
        let control = Self::wb(
            ColorTemperature::from_wb_name(color_temp)?,
            RgbChannel::parse(color)?,
            WbControl::parse(ctrl)?,
        );
        Some((source, control))
    }

    /// White-balance cell of `input_src` for its active mode and the live
    /// video format
    pub fn get_wb_ctrl(&self, input_src: &str, color_temp: &str, color: &str, ctrl: &str) -> Result<i32> {
        let session = self.session()?;
        let (source, control) =
            Self::parse_wb(input_src, color_temp, color, ctrl).ok_or_else(|| {
                TvError::InvalidParam(format!(
                    "unknown white balance cell {}/{}/{}/{}",
                    input_src, color_temp, color, ctrl
                ))
            })?;

        let ctx = session.playback()?;
        session.check_supported(&control, source, ctx.hdr_type)?;
        let key = session.key_for(source, ctx.hdr_type, control)?;
        session.read(&key)?.as_int().ok_or_else(|| {
            TvError::General(format!("{} holds a non-integer value", key))
        })
    }

    /// Set a white-balance cell of `input_src`; applied to hardware only when
    /// `input_src` is the live source
    pub fn set_wb_ctrl(
        &self,
        input_src: &str,
        color_temp: &str,
        color: &str,
        ctrl: &str,
        value: i32,
    ) -> Result<()> {
        let session = self.session()?;
        let (source, control) =
            Self::parse_wb(input_src, color_temp, color, ctrl).ok_or_else(|| {
                TvError::InvalidState(format!(
                    "unknown white balance cell {}/{}/{}/{}",
                    input_src, color_temp, color, ctrl
                ))
            })?;
        let value = CellValue::Int(value);
        session.validate(&control, &value)?;

        let _writer = session.writer.lock().map_err(poisoned)?;
        let ctx = session.playback()?;
        session.check_supported(&control, source, ctx.hdr_type)?;
        let key = session.key_for(source, ctx.hdr_type, control)?;

        if source == ctx.source {
            session.apply_live(&key, &value)?;
        }
        tracing::debug!("Set {} = {}", key, value);
        session.write(key, value)
    }

    // CMS

    fn cms(color: ComponentColor, tunnel: ComponentTunnel) -> Control {
        Control::Cms { color, tunnel }
    }

    fn is_reset(tunnel: ComponentTunnel, value: i32) -> bool {
        tunnel == ComponentTunnel::State && CmsState::from_raw(value) == Some(CmsState::Reset)
    }

    /// Tunnels restored by a CMS reset, with their defaults
    fn reset_values(color: ComponentColor) -> Vec<(Control, CellValue)> {
        ComponentTunnel::ALL
            .into_iter()
            .filter_map(|tunnel| {
                cells::cms_default(tunnel)
                    .map(|default| (Self::cms(color, tunnel), CellValue::Int(default)))
            })
            .collect()
    }

    pub fn get_cms(&self, color: ComponentColor, tunnel: ComponentTunnel) -> Result<i32> {
        self.get_int(Self::cms(color, tunnel))
    }

    /// Set a CMS tunnel; writing `CmsState::Reset` to the state tunnel
    /// restores the color's hue, saturation and luma defaults instead
    pub fn set_cms(&self, color: ComponentColor, tunnel: ComponentTunnel, value: i32) -> Result<()> {
        if !Self::is_reset(tunnel, value) {
            return self.set_value(Self::cms(color, tunnel), CellValue::Int(value));
        }

        for (control, default) in Self::reset_values(color) {
            self.set_value(control, default)?;
        }
        tracing::info!("CMS {} reset to defaults", color.as_str());
        Ok(())
    }

    pub fn save_cms(
        &self,
        source: SourceInput,
        pq_mode: u8,
        hdr_type: HdrType,
        color: ComponentColor,
        tunnel: ComponentTunnel,
        value: i32,
    ) -> Result<()> {
        if !Self::is_reset(tunnel, value) {
            return self.save_value(
                Self::cms(color, tunnel),
                source,
                pq_mode,
                hdr_type,
                CellValue::Int(value),
            );
        }

        for (control, default) in Self::reset_values(color) {
            self.save_value(control, source, pq_mode, hdr_type, default)?;
        }
        Ok(())
    }

    /// Default of a CMS tunnel by raw id (luma 15, hue and saturation 50),
    /// -1 for the state tunnel or an unknown id
    pub fn get_cms_default(tunnel: i32) -> i32 {
        ComponentTunnel::from_raw(tunnel)
            .and_then(cells::cms_default)
            .unwrap_or(-1)
    }

    // Gamma

    pub fn get_gamma_table(&self) -> Result<GammaTable> {
        match self.get_value(Control::GammaTable)? {
            CellValue::Gamma(table) => Ok(table),
            CellValue::Int(_) => Err(TvError::General("gamma cell holds an integer".into())),
        }
    }

    pub fn set_gamma_table(&self, table: GammaTable) -> Result<()> {
        self.set_value(Control::GammaTable, CellValue::Gamma(table))
    }

    pub fn save_gamma_table(
        &self,
        source: SourceInput,
        pq_mode: u8,
        hdr_type: HdrType,
        table: GammaTable,
    ) -> Result<()> {
        self.save_value(
            Control::GammaTable,
            source,
            pq_mode,
            hdr_type,
            CellValue::Gamma(table),
        )
    }

    // Dolby Vision / HDR10 / HLG mode lists

    fn mode_list_index(&self, parameter: PqParameter, name: &str) -> i32 {
        self.session()
            .ok()
            .and_then(|session| {
                session
                    .config
                    .mode_list(parameter)
                    .and_then(|list| list.iter().position(|m| m == name))
            })
            .map_or(-1, |i| i as i32)
    }

    fn supported_list(&self, parameter: PqParameter) -> Result<Vec<String>> {
        let session = self.session()?;
        match session.config.mode_list(parameter) {
            Some(list) if !list.is_empty() => Ok(list.to_vec()),
            _ => Err(TvError::OperationNotSupported(format!(
                "no {} modes configured",
                parameter
            ))),
        }
    }

    /// Position of a Dolby Vision mode, -1 when unknown
    pub fn get_dolby_mode_index(&self, name: &str) -> i32 {
        self.mode_list_index(PqParameter::DolbyVisionMode, name)
    }

    /// Position of an HDR10 mode, -1 when unknown
    pub fn get_hdr10_mode_index(&self, name: &str) -> i32 {
        self.mode_list_index(PqParameter::Hdr10Mode, name)
    }

    /// Position of an HLG mode, -1 when unknown
    pub fn get_hlg_mode_index(&self, name: &str) -> i32 {
        self.mode_list_index(PqParameter::HlgMode, name)
    }

    pub fn get_supported_dolby_modes(&self) -> Result<Vec<String>> {
        self.supported_list(PqParameter::DolbyVisionMode)
    }

    pub fn get_supported_hdr10_modes(&self) -> Result<Vec<String>> {
        self.supported_list(PqParameter::Hdr10Mode)
    }

    pub fn get_supported_hlg_modes(&self) -> Result<Vec<String>> {
        self.supported_list(PqParameter::HlgMode)
    }

    // Context queries

    pub fn current_source(&self) -> Result<SourceInput> {
        Ok(self.session()?.playback()?.source)
    }

    pub fn current_video_format(&self) -> Result<HdrType> {
        Ok(self.session()?.playback()?.hdr_type)
    }

    pub fn supported_sources(&self) -> Result<Vec<SourceInput>> {
        Ok(self.session()?.config.sources.clone())
    }

    /// Capability section governing `control`, if configured
    pub fn get_capability(&self, control: &Control) -> Result<Option<Capability>> {
        let session = self.session()?;
        Ok(session
            .config
            .read_capabilities(ranges::capability_section(control))
            .cloned())
    }

    /// Range a set/save of `control` is validated against
    pub fn get_range(&self, control: &Control) -> Result<ValueRange> {
        let session = self.session()?;
        ranges::effective_range(control, &session.config)
    }

    // Events

    /// Push every cell of the live context to the driver; returns the number
    /// of controls applied
    pub fn reapply_current(&self) -> Result<usize> {
        let session = self.session()?;
        let _writer = session.writer.lock().map_err(poisoned)?;
        let ctx = session.playback()?;
        session.push_context(ctx)
    }

    /// Re-apply the live cells whenever the video format changes
    ///
    /// The handler holds a weak reference, so the bus does not keep the
    /// store alive.
    pub fn watch_video_format(self: &Arc<Self>, bus: &NotificationBus) -> Result<()> {
        self.session()?;
        let store = Arc::downgrade(self);

        bus.register_video_format_change(move |format| {
            let Some(store) = store.upgrade() else {
                return;
            };
            tracing::info!("Video format changed to {}", format);
            if let Err(err) = store.reapply_current() {
                tracing::warn!("Failed to re-apply picture settings: {}", err);
            }
        })
    }
}

impl Drop for PictureSettingsStore {
    fn drop(&mut self) {
        if self.state() == StoreState::Ready {
            let _ = self.term();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tvpq_hal::ErrorKind;
    use tvpq_hal::mock::{MockDriver, MockPlatform};

    fn setup(platform: MockPlatform) -> (TempDir, MockDriver, PictureSettingsStore) {
        let dir = TempDir::new().unwrap();
        let settings = StoreConfig::in_dir(dir.path());
        ModeConfig::reference().save(&settings.mode_config).unwrap();

        let driver = MockDriver::new(platform);
        let store = PictureSettingsStore::new(settings, Arc::new(driver.clone()));
        (dir, driver, store)
    }

    #[test]
    fn test_lifecycle() {
        let (_dir, _driver, store) = setup(MockPlatform::Reference);
        assert_eq!(store.state(), StoreState::Uninitialized);
        assert_eq!(
            store.get(PqParameter::Backlight).unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        store.init().unwrap();
        assert_eq!(store.state(), StoreState::Ready);
        assert_eq!(store.init().unwrap_err().kind(), ErrorKind::InvalidState);

        store.term().unwrap();
        assert_eq!(store.state(), StoreState::Terminated);
        assert_eq!(store.init().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(
            store.set(PqParameter::Backlight, 10).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_term_before_init() {
        let (_dir, _driver, store) = setup(MockPlatform::Reference);
        assert_eq!(store.term().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(store.state(), StoreState::Uninitialized);
    }

    #[test]
    fn test_missing_mode_config() {
        let dir = TempDir::new().unwrap();
        let store = PictureSettingsStore::new(
            StoreConfig::in_dir(dir.path()),
            Arc::new(MockDriver::new(MockPlatform::Reference)),
        );
        assert_eq!(store.init().unwrap_err().kind(), ErrorKind::General);
        assert_eq!(store.state(), StoreState::Uninitialized);
    }

    #[test]
    fn test_defaults_follow_active_mode() {
        let (_dir, _driver, store) = setup(MockPlatform::Reference);
        store.init().unwrap();

        // Entertainment
        assert_eq!(store.get(PqParameter::Backlight).unwrap(), 70);
        assert_eq!(store.get(PqParameter::Hue).unwrap(), 50);

        store.set_picture_mode("Dynamic").unwrap();
        assert_eq!(store.get(PqParameter::Backlight).unwrap(), 100);
        assert_eq!(store.get_picture_mode().unwrap(), "Dynamic");
    }

    #[test]
    fn test_set_applies_to_driver() {
        let (_dir, driver, store) = setup(MockPlatform::Reference);
        store.init().unwrap();

        store.set(PqParameter::Contrast, 33).unwrap();
        assert_eq!(
            driver.applied(&Control::pq(PqParameter::Contrast)),
            Some(CellValue::Int(33))
        );
    }

    #[test]
    fn test_unsupported_on_platform() {
        let (_dir, _driver, store) = setup(MockPlatform::Oled);
        store.init().unwrap();

        let err = store.set(PqParameter::Backlight, 40).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationNotSupported);
        let err = store.get(PqParameter::DimmingMode).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationNotSupported);
    }

    #[test]
    fn test_cms_default_sentinel() {
        assert_eq!(PictureSettingsStore::get_cms_default(ComponentTunnel::Luma.raw()), 15);
        assert_eq!(PictureSettingsStore::get_cms_default(ComponentTunnel::Hue.raw()), 50);
        assert_eq!(
            PictureSettingsStore::get_cms_default(ComponentTunnel::Saturation.raw()),
            50
        );
        assert_eq!(PictureSettingsStore::get_cms_default(ComponentTunnel::State.raw()), -1);
        assert_eq!(PictureSettingsStore::get_cms_default(9), -1);
    }

    #[test]
    fn test_mode_list_sentinels() {
        let (_dir, _driver, store) = setup(MockPlatform::Reference);
        assert_eq!(store.get_dolby_mode_index("Dark"), -1);

        store.init().unwrap();
        assert_eq!(store.get_dolby_mode_index("Bright"), 1);
        assert_eq!(store.get_hdr10_mode_index("Dark"), 0);
        assert_eq!(store.get_hlg_mode_index("Game"), -1);
        assert_eq!(
            store.get_supported_dolby_modes().unwrap(),
            vec!["Dark", "Bright", "Game"]
        );
    }

    #[test]
    fn test_resolve_mode_index() {
        let (_dir, _driver, store) = setup(MockPlatform::Reference);
        store.init().unwrap();

        assert_eq!(store.resolve_mode_index("Movie"), 3);
        assert_eq!(store.resolve_mode_index("movie"), PICTURE_MODE_MAX);
        assert_eq!(store.resolve_mode_index("NonexistentMode"), PICTURE_MODE_MAX);
    }
}
