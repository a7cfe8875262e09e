//! Collector dispatch loop
//!
//! Connects a [`FeedSource`], consumes its messages one at a time, keeps the
//! shared [`TimeSource`] resynchronised once per minute, applies each event
//! to the [`Dataset`] and raises exactly one [`Notification`] per message.
//!
//! ```text
//! FeedSource ──mpsc──▶ Collector::run ──▶ dispatch ──▶ Dataset::apply
//!                           ▲                              │
//!                      StopHandle                     Observer
//! ```
//!
//! The channel has a single consumer and `dispatch` takes `&mut self`, so
//! dataset mutations are serialized. The dataset mutex only arbitrates
//! between the dispatch path and outside readers.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::clock::TimeSource;
use crate::config::{CollectorConfig, ConfigError};
use crate::dataset::{Dataset, Routing};
use crate::events::{FeedEvent, Notification};
use crate::feed::{FeedError, FeedMessage, FeedSource, Subscription};
use crate::metrics::CollectorMetrics;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectorError {
    #[error("collector is not started")]
    NotStarted,

    #[error("collector is already started")]
    AlreadyStarted,

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Receives one notification per feed message.
///
/// Runs inside the dispatch path while the dataset is locked; long work
/// delays the next event.
pub trait Observer: Send {
    fn on_notification(&mut self, notification: Notification<'_>);
}

impl<F> Observer for F
where
    F: FnMut(Notification<'_>) + Send,
{
    fn on_notification(&mut self, notification: Notification<'_>) {
        self(notification)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Running,
    Stop,
    Interrupt,
}

/// Requests a cooperative stop of [`Collector::run`]. The event being
/// dispatched when the request arrives is completed first.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<StopSignal>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(StopSignal::Stop);
    }

    /// Stop and raise an `Interrupted` notification.
    pub fn interrupt(&self) {
        self.tx.send_replace(StopSignal::Interrupt);
    }
}

pub struct Collector<F> {
    feed: F,
    subscriptions: Vec<Subscription>,
    capacity: usize,
    time: Arc<TimeSource>,
    dataset: Arc<Mutex<Dataset>>,
    observer: Option<Box<dyn Observer>>,
    metrics: Arc<CollectorMetrics>,
    last_resync_minute: Option<i64>,
    inbox: Option<mpsc::Receiver<FeedMessage>>,
    stop: Arc<watch::Sender<StopSignal>>,
}

impl<F: FeedSource> Collector<F> {
    /// Build a collector on the time source the config describes.
    pub fn from_config(config: &CollectorConfig, feed: F) -> Result<Self, CollectorError> {
        Self::new(config, feed, Arc::new(config.time_source()))
    }

    /// Build a collector over `feed` with one depth book and tick series
    /// per configured instrument.
    pub fn new(config: &CollectorConfig, feed: F, time: Arc<TimeSource>) -> Result<Self, CollectorError> {
        config.validate()?;

        let mut dataset = Dataset::new(time.clone(), config.depth_config(), config.keep_time());
        for instrument in &config.instruments {
            dataset.register(instrument.id.clone(), instrument.role);
        }

        info!(
            instruments = config.instruments.len(),
            keep_time_secs = config.keep_time_secs,
            depth_max_len = config.depth_max_len,
            mid_price_filter = config.mid_price_filter,
            "Collector configured"
        );

        let (stop, _) = watch::channel(StopSignal::Running);
        Ok(Self {
            feed,
            subscriptions: config.subscriptions(),
            capacity: config.channel_capacity,
            time,
            dataset: Arc::new(Mutex::new(dataset)),
            observer: None,
            metrics: Arc::new(CollectorMetrics::new()),
            last_resync_minute: None,
            inbox: None,
            stop: Arc::new(stop),
        })
    }

    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn set_observer(&mut self, observer: impl Observer + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Shared handle for readers outside the dispatch path.
    pub fn dataset(&self) -> Arc<Mutex<Dataset>> {
        Arc::clone(&self.dataset)
    }

    pub fn metrics(&self) -> Arc<CollectorMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop),
        }
    }

    pub fn is_started(&self) -> bool {
        self.inbox.is_some()
    }

    /// Synchronise the clock and connect the feed.
    pub async fn start(&mut self) -> Result<(), CollectorError> {
        if self.inbox.is_some() {
            return Err(CollectorError::AlreadyStarted);
        }

        self.resync_if_due().await;
        self.stop.send_replace(StopSignal::Running);

        let (tx, rx) = mpsc::channel(self.capacity);
        self.feed.connect(&self.subscriptions, tx).await?;
        self.inbox = Some(rx);

        info!(
            subscriptions = self.subscriptions.len(),
            capacity = self.capacity,
            "Collector started"
        );
        Ok(())
    }

    /// Dispatch messages until the feed closes or a stop is requested.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        let mut inbox = self.inbox.take().ok_or(CollectorError::NotStarted)?;
        let mut stop = self.stop.subscribe();

        loop {
            if self.handle_stop(*stop.borrow_and_update()) {
                break;
            }

            tokio::select! {
                biased;

                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                message = inbox.recv() => match message {
                    Some(message) => self.dispatch(message).await,
                    None => {
                        info!("Feed closed");
                        break;
                    }
                },
            }
        }

        self.inbox = Some(inbox);
        Ok(())
    }

    /// Like [`run`](Self::run), interrupting on Ctrl-C.
    pub async fn run_until_ctrl_c(&mut self) -> Result<(), CollectorError> {
        let handle = self.stop_handle();
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.interrupt();
            }
        });

        let result = self.run().await;
        signal.abort();
        result
    }

    fn handle_stop(&mut self, signal: StopSignal) -> bool {
        match signal {
            StopSignal::Running => false,
            StopSignal::Stop => {
                info!("Stop requested");
                true
            }
            StopSignal::Interrupt => {
                info!("Interrupt requested");
                self.metrics.record_interrupt();
                self.notify(Notification::interrupted());
                true
            }
        }
    }

    /// Disconnect the feed. Messages still queued are discarded.
    pub async fn stop(&mut self) -> Result<(), CollectorError> {
        self.stop.send_replace(StopSignal::Stop);
        self.feed.disconnect().await?;
        self.inbox = None;
        info!("Collector stopped");
        Ok(())
    }

    /// Process one feed message and notify the observer exactly once.
    pub async fn dispatch(&mut self, message: FeedMessage) {
        let started = Instant::now();

        match message {
            FeedMessage::Event(event) => {
                self.resync_if_due().await;
                self.apply(&event);
            }
            FeedMessage::Error(FeedError::Interrupted) => {
                warn!("Feed interrupted");
                self.metrics.record_interrupt();
                self.notify(Notification::interrupted());
            }
            FeedMessage::Error(err) => {
                warn!(error = %err, "Feed error");
                self.metrics.record_feed_error();
                self.notify(Notification::error());
            }
        }

        let elapsed = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.metrics.record_dispatch(elapsed);
    }

    fn apply(&mut self, event: &FeedEvent) {
        let dataset = Arc::clone(&self.dataset);
        let mut dataset = dataset.lock().unwrap_or_else(PoisonError::into_inner);

        match dataset.apply(event) {
            Ok(routing) => {
                if routing == Routing::Ignored {
                    self.metrics.record_dropped();
                }
                debug!(
                    instrument = %event.instrument(),
                    event_type = event.event_type_label(),
                    ?routing,
                    "Event dispatched"
                );
                self.notify(Notification::changed(event.notification_kind(), &dataset));
            }
            Err(err) => {
                warn!(error = %err, event_type = event.event_type_label(), "Dropping event");
                self.metrics.record_dropped();
                self.notify(Notification::error());
            }
        }
    }

    fn notify(&mut self, notification: Notification<'_>) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_notification(notification);
        }
    }

    async fn resync_if_due(&mut self) {
        let minute = self.time.minute_index();
        if self.last_resync_minute == Some(minute) {
            return;
        }
        let succeeded = self.time.resync().await;
        self.metrics.record_resync(succeeded);
        self.last_resync_minute = Some(minute);
    }
}

impl<F> fmt::Debug for Collector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("subscriptions", &self.subscriptions)
            .field("capacity", &self.capacity)
            .field("time", &self.time)
            .field("started", &self.inbox.is_some())
            .field("last_resync_minute", &self.last_resync_minute)
            .finish()
    }
}
