//! Video pipeline notification bus
//!
//! The video pipeline publishes format, content, resolution and frame-rate
//! changes through an [`EventPublisher`]. Events are queued and handed to the
//! registered handler on the bus's own dispatcher thread, so handlers never run
//! on the publisher's thread. Each event kind has a single handler slot;
//! registering again replaces the previous handler.

use crate::types::HdrType;
use crate::{Result, TvError};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

/// Content classification signalled by the source (FMM = filmmaker mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Unknown,
    FilmMaker,
    Game,
}

/// Active video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoResolution {
    pub width: u32,
    pub height: u32,
    pub interlaced: bool,
}

/// Frame rate in millihertz (23.976 fps = 23976)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate(pub u32);

impl FrameRate {
    pub fn fps(self) -> f32 {
        self.0 as f32 / 1000.0
    }
}

/// Events delivered by the video pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum VideoEvent {
    /// Dynamic range of the playing content changed
    FormatChanged(HdrType),
    /// Content type (FMM) changed
    ContentChanged(ContentType),
    ResolutionChanged(VideoResolution),
    FrameRateChanged(FrameRate),
}

impl VideoEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            VideoEvent::FormatChanged(_) => EventKind::VideoFormat,
            VideoEvent::ContentChanged(_) => EventKind::Content,
            VideoEvent::ResolutionChanged(_) => EventKind::Resolution,
            VideoEvent::FrameRateChanged(_) => EventKind::FrameRate,
        }
    }
}

/// Handler slot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    VideoFormat,
    Content,
    Resolution,
    FrameRate,
}

type Handler = Arc<dyn Fn(&VideoEvent) + Send + Sync>;

enum Envelope {
    Event(VideoEvent),
    Shutdown,
}

/// Handle given to the video pipeline for publishing events
#[derive(Clone)]
pub struct EventPublisher {
    tx: Sender<Envelope>,
}

impl EventPublisher {
    /// Queue an event for dispatch
    pub fn publish(&self, event: VideoEvent) -> Result<()> {
        self.tx
            .send(Envelope::Event(event))
            .map_err(|_| TvError::General("notification bus stopped".into()))
    }
}

/// Dispatches video pipeline events to one handler per event kind
pub struct NotificationBus {
    tx: Sender<Envelope>,
    handlers: Arc<RwLock<HashMap<EventKind, Handler>>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl NotificationBus {
    /// Create the bus and start its dispatcher thread
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();
        let handlers: Arc<RwLock<HashMap<EventKind, Handler>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let dispatch_handlers = Arc::clone(&handlers);
        let dispatcher = thread::Builder::new()
            .name("tvpq-events".into())
            .spawn(move || Self::dispatch(rx, dispatch_handlers))?;

        Ok(Self {
            tx,
            handlers,
            dispatcher: Some(dispatcher),
        })
    }

    fn dispatch(rx: Receiver<Envelope>, handlers: Arc<RwLock<HashMap<EventKind, Handler>>>) {
        tracing::info!("Notification bus started");

        while let Ok(Envelope::Event(event)) = rx.recv() {
            let handler = handlers
                .read()
                .ok()
                .and_then(|h| h.get(&event.kind()).cloned());

            match handler {
                Some(handler) => handler(&event),
                None => tracing::debug!("No handler for {:?}", event),
            }
        }

        tracing::info!("Notification bus stopped");
    }

    /// Handle for the video pipeline
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            tx: self.tx.clone(),
        }
    }

    /// Install the handler for `kind`, replacing any previous one
    pub fn register<F>(&self, kind: EventKind, handler: F) -> Result<()>
    where
        F: Fn(&VideoEvent) + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| TvError::General("handler table poisoned".into()))?;

        if handlers.insert(kind, Arc::new(handler)).is_some() {
            tracing::warn!("Replacing existing {:?} handler", kind);
        }
        Ok(())
    }

    /// Whether a handler is installed for `kind`
    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(&kind))
            .unwrap_or(false)
    }

    pub fn register_video_format_change<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(HdrType) + Send + Sync + 'static,
    {
        self.register(EventKind::VideoFormat, move |event| {
            if let VideoEvent::FormatChanged(format) = event {
                callback(*format);
            }
        })
    }

    pub fn register_content_change<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(ContentType) + Send + Sync + 'static,
    {
        self.register(EventKind::Content, move |event| {
            if let VideoEvent::ContentChanged(content) = event {
                callback(*content);
            }
        })
    }

    pub fn register_resolution_change<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(VideoResolution) + Send + Sync + 'static,
    {
        self.register(EventKind::Resolution, move |event| {
            if let VideoEvent::ResolutionChanged(resolution) = event {
                callback(*resolution);
            }
        })
    }

    pub fn register_frame_rate_change<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(FrameRate) + Send + Sync + 'static,
    {
        self.register(EventKind::FrameRate, move |event| {
            if let VideoEvent::FrameRateChanged(rate) = event {
                callback(*rate);
            }
        })
    }
}

impl Drop for NotificationBus {
    fn drop(&mut self) {
        let _ = self.tx.send(Envelope::Shutdown);
        if let Some(dispatcher) = self.dispatcher.take() {
            // A handler dropping the bus runs on the dispatcher itself
            if dispatcher.thread().id() == thread::current().id() {
                tracing::debug!("Notification bus dropped from its dispatcher");
                return;
            }
            let _ = dispatcher.join();
        }
    }
}
