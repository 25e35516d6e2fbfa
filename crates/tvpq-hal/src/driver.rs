//! Driver sink contract
//!
//! SoC vendors implement [`DriverSink`] to push validated picture values to
//! hardware and to report the live playback context. The settings store never
//! calls a sink directly: every call goes through a [`DriverWorker`], which
//! runs the sink on its own threads and bounds each call with a timeout.

use crate::types::{CellValue, Control, HdrType, SourceInput};
use crate::{Result, TvError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Live playback state reported by the video pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackContext {
    /// Currently selected input (always concrete)
    pub source: SourceInput,
    /// Detected dynamic range of the playing content
    pub hdr_type: HdrType,
}

impl Default for PlaybackContext {
    fn default() -> Self {
        Self {
            source: SourceInput::Hdmi,
            hdr_type: HdrType::Sdr,
        }
    }
}

/// Vendor driver backend
pub trait DriverSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Apply a validated value to hardware
    fn apply(&self, control: &Control, value: &CellValue) -> Result<()>;

    /// Current source and detected video format
    fn playback(&self) -> Result<PlaybackContext>;

    /// Whether this platform implements the control at all
    fn supports(&self, control: &Control) -> bool {
        let _ = control;
        true
    }
}

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Queued driver call; skipped when its caller gave up before it started
struct Job {
    ticket: Arc<AtomicU8>,
    run: Box<dyn FnOnce(&dyn DriverSink) + Send>,
}

impl Job {
    fn new(run: impl FnOnce(&dyn DriverSink) + Send + 'static) -> Self {
        Self {
            ticket: Arc::new(AtomicU8::new(PENDING)),
            run: Box::new(run),
        }
    }
}

/// Whether a timed-out call may still reach the sink
enum Expired {
    /// Withdrawn from the queue before the sink saw it
    Cancelled,
    /// Already running; its effect lands once the sink returns
    Started,
}

/// One worker thread and its queue
struct Lane {
    jobs: Mutex<Option<Sender<Job>>>,
}

impl Lane {
    fn spawn(sink: Arc<dyn DriverSink>, thread_name: String) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();

        thread::Builder::new().name(thread_name).spawn(move || {
            tracing::debug!("Driver lane {} started", sink.name());
            while let Ok(job) = rx.recv() {
                if job
                    .ticket
                    .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    (job.run)(sink.as_ref());
                } else {
                    tracing::debug!("Skipping driver call abandoned by its caller");
                }
            }
            tracing::debug!("Driver lane {} stopped", sink.name());
        })?;

        Ok(Self {
            jobs: Mutex::new(Some(tx)),
        })
    }

    fn submit(&self, name: &str, job: Job) -> Result<()> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| TvError::General("driver worker lock poisoned".into()))?;
        let tx = jobs
            .as_ref()
            .ok_or_else(|| TvError::General(format!("driver {} is shut down", name)))?;
        tx.send(job)
            .map_err(|_| TvError::General(format!("driver {} worker exited", name)))
    }

    fn close(&self) -> bool {
        self.jobs.lock().map(|mut jobs| jobs.take().is_some()).unwrap_or(false)
    }
}

/// Runs driver calls on dedicated threads with a bounded reply timeout
///
/// Applies and queries use separate threads, so a stalled apply never
/// delays `playback` or `supports`.
pub struct DriverWorker {
    name: String,
    applies: Lane,
    queries: Lane,
    timeout: Duration,
}

impl DriverWorker {
    /// Spawn the worker threads for `sink`
    pub fn spawn(sink: Arc<dyn DriverSink>, timeout: Duration) -> Result<Self> {
        let name = sink.name().to_string();
        let applies = Lane::spawn(Arc::clone(&sink), format!("tvpq-driver-{}", name))?;
        let queries = Lane::spawn(sink, format!("tvpq-query-{}", name))?;

        Ok(Self {
            name,
            applies,
            queries,
            timeout,
        })
    }

    /// Driver name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn dispatch<T, F>(&self, lane: &Lane, f: F) -> Result<std::result::Result<T, Expired>>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DriverSink) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job = Job::new(move |sink: &dyn DriverSink| {
            let _ = reply_tx.send(f(sink));
        });
        let ticket = Arc::clone(&job.ticket);
        lane.submit(&self.name, job)?;

        match reply_rx.recv_timeout(self.timeout) {
            Ok(result) => result.map(Ok),
            Err(RecvTimeoutError::Timeout) => {
                let withdrawn = ticket
                    .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                tracing::warn!(
                    "Driver {} did not answer within {:?} ({})",
                    self.name,
                    self.timeout,
                    if withdrawn { "cancelled" } else { "still running" }
                );
                Ok(Err(if withdrawn {
                    Expired::Cancelled
                } else {
                    Expired::Started
                }))
            }
            Err(RecvTimeoutError::Disconnected) => Err(TvError::General(format!(
                "driver {} dropped the request",
                self.name
            ))),
        }
    }

    fn timed_out(&self) -> TvError {
        TvError::General(format!(
            "driver {} timed out after {:?}",
            self.name, self.timeout
        ))
    }

    /// Run `f` against the sink and wait at most `timeout` for its result
    ///
    /// A call still queued when the timeout expires never reaches the sink.
    pub fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DriverSink) -> Result<T> + Send + 'static,
    {
        self.dispatch(&self.applies, f)?
            .map_err(|_| self.timed_out())
    }

    /// Apply a value through the worker
    pub fn apply(&self, control: Control, value: CellValue) -> Result<()> {
        self.call(move |sink| sink.apply(&control, &value))
    }

    /// Apply `value`; when the call times out after the sink already took
    /// it, queue `previous` behind it so hardware ends up on `previous`
    pub fn apply_or_revert(
        &self,
        control: Control,
        value: CellValue,
        previous: CellValue,
    ) -> Result<()> {
        match self.dispatch(&self.applies, move |sink| sink.apply(&control, &value))? {
            Ok(()) => Ok(()),
            Err(Expired::Cancelled) => Err(self.timed_out()),
            Err(Expired::Started) => {
                tracing::warn!("Reverting {} to {} after timeout", control, previous);
                let revert = Job::new(move |sink: &dyn DriverSink| {
                    if let Err(err) = sink.apply(&control, &previous) {
                        tracing::warn!("Failed to revert {}: {}", control, err);
                    }
                });
                self.applies.submit(&self.name, revert)?;
                Err(self.timed_out())
            }
        }
    }

    /// Query the live playback context through the worker
    pub fn playback(&self) -> Result<PlaybackContext> {
        self.dispatch(&self.queries, |sink| sink.playback())?
            .map_err(|_| self.timed_out())
    }

    /// Query platform support through the worker
    pub fn supports(&self, control: Control) -> Result<bool> {
        self.dispatch(&self.queries, move |sink| Ok(sink.supports(&control)))?
            .map_err(|_| self.timed_out())
    }

    /// Stop accepting calls; the threads exit once queued jobs drain
    pub fn shutdown(&self) {
        let applies = self.applies.close();
        let queries = self.queries.close();
        if applies || queries {
            tracing::debug!("Driver worker for {} shutting down", self.name);
        }
    }
}

impl Drop for DriverWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockPlatform};
    use crate::types::PqParameter;
    use crate::ErrorKind;

    fn worker(driver: &MockDriver, timeout_ms: u64) -> DriverWorker {
        DriverWorker::spawn(Arc::new(driver.clone()), Duration::from_millis(timeout_ms)).unwrap()
    }

    #[test]
    fn test_playback_context_default() {
        let ctx = PlaybackContext::default();
        assert_eq!(ctx.source, SourceInput::Hdmi);
        assert_eq!(ctx.hdr_type, HdrType::Sdr);
    }

    #[test]
    fn test_worker_applies() {
        let driver = MockDriver::new(MockPlatform::Reference);
        let worker = worker(&driver, 500);
        let backlight = Control::pq(PqParameter::Backlight);

        worker.apply(backlight, CellValue::Int(42)).unwrap();
        assert_eq!(driver.applied(&backlight), Some(CellValue::Int(42)));
        assert_eq!(worker.name(), "mock-reference");
    }

    #[test]
    fn test_worker_propagates_driver_error() {
        let driver = MockDriver::new(MockPlatform::Reference);
        driver.fail_applies(true);
        let worker = worker(&driver, 500);

        let err = worker
            .apply(Control::pq(PqParameter::Contrast), CellValue::Int(10))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::General);
    }

    #[test]
    fn test_worker_times_out() {
        let driver = MockDriver::new(MockPlatform::Reference);
        driver.set_apply_delay(Duration::from_millis(300));
        let worker = worker(&driver, 20);

        let err = worker
            .apply(Control::pq(PqParameter::Contrast), CellValue::Int(10))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::General);
        assert!(format!("{}", err).contains("timed out"));
    }

    #[test]
    fn test_abandoned_call_never_reaches_sink() {
        let driver = MockDriver::new(MockPlatform::Reference);
        driver.set_apply_delay(Duration::from_millis(200));
        let worker = worker(&driver, 20);
        let contrast = Control::pq(PqParameter::Contrast);
        let hue = Control::pq(PqParameter::Hue);

        assert!(worker.apply(contrast, CellValue::Int(10)).is_err());
        // Queued behind the stalled apply, withdrawn on timeout
        assert!(worker.apply(hue, CellValue::Int(20)).is_err());

        thread::sleep(Duration::from_millis(500));
        assert_eq!(driver.applied(&contrast), Some(CellValue::Int(10)));
        assert_eq!(driver.applied(&hue), None);
        assert_eq!(driver.apply_count(), 1);
    }

    #[test]
    fn test_queries_not_blocked_by_stalled_apply() {
        let driver = MockDriver::new(MockPlatform::Reference);
        driver.set_apply_delay(Duration::from_millis(300));
        let worker = worker(&driver, 50);

        assert!(
            worker
                .apply(Control::pq(PqParameter::Tint), CellValue::Int(3))
                .is_err()
        );
        assert_eq!(worker.playback().unwrap(), PlaybackContext::default());
        assert!(worker.supports(Control::pq(PqParameter::Tint)).unwrap());
    }

    #[test]
    fn test_timed_out_apply_is_reverted() {
        let driver = MockDriver::new(MockPlatform::Reference);
        driver.set_apply_delay(Duration::from_millis(100));
        let worker = worker(&driver, 20);
        let sharpness = Control::pq(PqParameter::Sharpness);

        let err = worker
            .apply_or_revert(sharpness, CellValue::Int(10), CellValue::Int(50))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::General);

        thread::sleep(Duration::from_millis(500));
        assert_eq!(driver.applied(&sharpness), Some(CellValue::Int(50)));
        assert_eq!(driver.apply_count(), 2);
    }

    #[test]
    fn test_worker_after_shutdown() {
        let driver = MockDriver::new(MockPlatform::Reference);
        let worker = worker(&driver, 500);
        worker.shutdown();

        let err = worker.playback().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::General);
    }

    #[test]
    fn test_worker_supports_query() {
        let driver = MockDriver::new(MockPlatform::Basic);
        let worker = worker(&driver, 500);

        assert!(worker.supports(Control::pq(PqParameter::Backlight)).unwrap());
        assert!(!worker.supports(Control::pq(PqParameter::DolbyVisionMode)).unwrap());
    }
}
