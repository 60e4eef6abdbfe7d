//! Progress events and rate-limited delivery.
//!
//! Producers (the part writer, the compression workers) push tagged events
//! onto a bounded channel; a single consumer thread applies the throttle
//! policy and forwards surviving events to a [`ProgressSink`]. Events are
//! plain owned values so they cross thread and process boundaries safely.
//!
//! Throttling: intermediate page-copy events are dropped unless the minimum
//! interval has elapsed since the last delivery. Boundary events (a finished
//! part, anything in the compression phase, whole-document completion,
//! errors, the final summary) always go through. The throttle clock resets
//! at the start of each document in a batch so a document's first event is
//! never dropped.

use serde::Serialize;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Minimum interval between intermediate progress deliveries (~12/sec).
pub const PROGRESS_THROTTLE: Duration = Duration::from_millis(80);

/// Depth of the bounded event queue between producers and the reporter.
const EVENT_QUEUE_DEPTH: usize = 256;

/// One progress event emitted by a running operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Page-granular progress within one document.
    Progress {
        current_page: usize,
        total_pages: usize,
        /// 1-based part currently being produced.
        current_part: usize,
        total_parts: usize,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bytes_written: Option<u64>,
    },
    /// One source document finished; `outputs` are the part file names.
    PartComplete {
        filename: String,
        outputs: Vec<String>,
    },
    /// A worker began compressing the given 1-based part.
    CompressionPartStart { part: usize },
    /// Sampled size of a part's growing temporary output.
    CompressionProgress {
        part: usize,
        temp_size: u64,
        input_size: u64,
        estimated_output_size: u64,
    },
    /// Batch summary; fires exactly once per batch.
    AllComplete {
        completed: usize,
        total: usize,
        total_parts: usize,
        elapsed_seconds: f64,
        cancelled: bool,
    },
    /// A document failed; the batch moves on to the next one.
    Error { message: String },
}

impl Event {
    /// Whether this event must be delivered regardless of the throttle.
    fn bypasses_throttle(&self) -> bool {
        match self {
            Event::Progress {
                current_page,
                total_pages,
                status,
                ..
            } => {
                // Whole-document completion, part boundaries and
                // compression-phase statuses always land.
                current_page >= total_pages
                    || status.contains("written")
                    || status.contains("Compressing")
            }
            _ => true,
        }
    }
}

/// Receives delivered events. Implementations render to a terminal, serialize
/// to a UI bridge, or collect for tests.
pub trait ProgressSink: Send {
    fn emit(&mut self, event: Event);
}

/// Sink that discards everything.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&mut self, _event: Event) {}
}

/// Applies the throttle policy in front of a sink.
pub struct ProgressReporter {
    sink: Box<dyn ProgressSink>,
    throttle: Duration,
    last_delivery: Option<Instant>,
}

impl ProgressReporter {
    pub fn new(sink: Box<dyn ProgressSink>) -> Self {
        Self::with_throttle(sink, PROGRESS_THROTTLE)
    }

    pub fn with_throttle(sink: Box<dyn ProgressSink>, throttle: Duration) -> Self {
        Self {
            sink,
            throttle,
            last_delivery: None,
        }
    }

    /// Reset the throttle clock; the next event is always delivered.
    pub fn begin_document(&mut self) {
        self.last_delivery = None;
    }

    /// Deliver or drop one event according to the throttle policy.
    pub fn report(&mut self, event: Event) {
        if !event.bypasses_throttle() {
            if let Some(last) = self.last_delivery {
                if last.elapsed() < self.throttle {
                    return;
                }
            }
        }
        self.last_delivery = Some(Instant::now());
        self.sink.emit(event);
    }
}

/// Control messages carried on the event queue alongside events.
enum Message {
    Event(Event),
    ResetThrottle,
}

/// Producer handle onto the bounded event queue. Cheap to clone; every
/// producer thread gets its own.
#[derive(Clone)]
pub struct EventSender {
    tx: SyncSender<Message>,
}

impl EventSender {
    /// Push an event, blocking if the queue is full. A disconnected consumer
    /// (sink dropped early) is ignored; producers must not fail because
    /// nobody is listening.
    pub fn send(&self, event: Event) {
        let _ = self.tx.send(Message::Event(event));
    }

    /// Push an event only if the queue has room. Used by samplers whose data
    /// goes stale immediately.
    pub fn try_send(&self, event: Event) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(Message::Event(event)) {
            // Stale by the time a slot frees up; drop it.
        }
    }

    /// Reset the consumer's throttle clock (start of a new document).
    pub fn reset_throttle(&self) {
        let _ = self.tx.send(Message::ResetThrottle);
    }
}

/// Consumer side: a thread draining the queue into a [`ProgressReporter`].
pub struct EventChannel {
    handle: JoinHandle<()>,
}

impl EventChannel {
    /// Spawn the consumer thread. The channel closes when every
    /// [`EventSender`] clone has been dropped.
    pub fn spawn(reporter: ProgressReporter) -> (EventSender, EventChannel) {
        let (tx, rx) = std::sync::mpsc::sync_channel(EVENT_QUEUE_DEPTH);
        let handle = std::thread::spawn(move || Self::drain(rx, reporter));
        (EventSender { tx }, EventChannel { handle })
    }

    fn drain(rx: Receiver<Message>, mut reporter: ProgressReporter) {
        for message in rx {
            match message {
                Message::Event(event) => reporter.report(event),
                Message::ResetThrottle => reporter.begin_document(),
            }
        }
    }

    /// Wait for the consumer to drain the queue and exit. Call after
    /// dropping all senders.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}
