//! Feed boundary
//!
//! A [`FeedSource`] delivers decoded [`FeedEvent`]s into a bounded channel
//! whose single consumer is the collector. Transport and wire decoding live
//! behind this trait; [`JsonLinesFeed`] is the bundled implementation for
//! newline-delimited JSON captures and pipes.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::ids::InstrumentId;

use crate::events::FeedEvent;

/// Feed-side failures. Delivered to the collector as messages, never
/// raised past the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// Operator asked the feed to stop
    #[error("feed interrupted by operator")]
    Interrupted,

    #[error("undecodable message at line {line}: {reason}")]
    Decode { line: u64, reason: String },

    #[error("feed transport failed: {0}")]
    Transport(String),

    #[error("feed source already consumed")]
    Exhausted,
}

/// One item delivered by a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    Event(FeedEvent),
    Error(FeedError),
}

/// Public channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    BoardSnapshot,
    Board,
    Executions,
    Ticker,
}

impl Channel {
    fn prefix(&self) -> &'static str {
        match self {
            Channel::BoardSnapshot => "lightning_board_snapshot",
            Channel::Board => "lightning_board",
            Channel::Executions => "lightning_executions",
            Channel::Ticker => "lightning_ticker",
        }
    }

    /// Channel carrying this kind of event.
    pub fn of(event: &FeedEvent) -> Self {
        match event {
            FeedEvent::DepthSnapshot(_) => Channel::BoardSnapshot,
            FeedEvent::DepthDiff(_) => Channel::Board,
            FeedEvent::Quote(_) => Channel::Ticker,
            FeedEvent::Executions(_) => Channel::Executions,
        }
    }
}

/// A channel for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subscription {
    pub channel: Channel,
    pub instrument: InstrumentId,
}

impl Subscription {
    pub fn new(channel: Channel, instrument: InstrumentId) -> Self {
        Self { channel, instrument }
    }

    pub fn matches(&self, event: &FeedEvent) -> bool {
        self.channel == Channel::of(event) && &self.instrument == event.instrument()
    }
}

impl fmt::Display for Subscription {
    /// Exchange channel name, e.g. `lightning_ticker_FX_BTC_JPY`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.channel.prefix(), self.instrument)
    }
}

/// Source of feed messages.
#[async_trait]
pub trait FeedSource: Send {
    /// Start delivering messages for `subscriptions` into `sink`.
    ///
    /// Delivery ends when the source is exhausted or disconnected; the sink
    /// is dropped at that point so the consumer sees the channel close.
    async fn connect(
        &mut self,
        subscriptions: &[Subscription],
        sink: mpsc::Sender<FeedMessage>,
    ) -> Result<(), FeedError>;

    /// Stop delivering. Idempotent.
    async fn disconnect(&mut self) -> Result<(), FeedError>;
}

/// Feed reading one JSON-encoded [`FeedEvent`] per line.
///
/// Events outside the subscriptions are skipped. Undecodable lines are
/// forwarded as [`FeedError::Decode`] and reading continues.
pub struct JsonLinesFeed<R> {
    reader: Option<R>,
    task: Option<JoinHandle<()>>,
}

impl<R> JsonLinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            task: None,
        }
    }

    /// True while the reader task is delivering.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<R> fmt::Debug for JsonLinesFeed<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesFeed")
            .field("consumed", &self.reader.is_none())
            .field("task", &self.task.is_some())
            .finish()
    }
}

#[async_trait]
impl<R> FeedSource for JsonLinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn connect(
        &mut self,
        subscriptions: &[Subscription],
        sink: mpsc::Sender<FeedMessage>,
    ) -> Result<(), FeedError> {
        let reader = self.reader.take().ok_or(FeedError::Exhausted)?;
        let subscriptions: BTreeSet<Subscription> = subscriptions.iter().cloned().collect();
        info!(subscriptions = subscriptions.len(), "JSON-lines feed connected");

        self.task = Some(tokio::spawn(read_lines(reader, subscriptions, sink)));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), FeedError> {
        if let Some(task) = self.task.take() {
            task.abort();
            // a cancelled task reports a JoinError; nothing to recover
            let _ = task.await;
            info!("JSON-lines feed disconnected");
        }
        Ok(())
    }
}

async fn read_lines<R>(reader: R, subscriptions: BTreeSet<Subscription>, sink: mpsc::Sender<FeedMessage>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(lines = line_no, "End of feed input");
                return;
            }
            Err(err) => {
                warn!(error = %err, line = line_no + 1, "Feed read failed");
                // the consumer may already be gone
                let _ = sink.send(FeedMessage::Error(FeedError::Transport(err.to_string()))).await;
                return;
            }
        };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<FeedEvent>(&line) {
            Ok(event) if subscriptions.iter().any(|s| s.matches(&event)) => FeedMessage::Event(event),
            Ok(event) => {
                debug!(
                    line = line_no,
                    instrument = %event.instrument(),
                    event_type = event.event_type_label(),
                    "Skipping unsubscribed event"
                );
                continue;
            }
            Err(err) => {
                warn!(line = line_no, error = %err, "Undecodable feed line");
                FeedMessage::Error(FeedError::Decode {
                    line: line_no,
                    reason: err.to_string(),
                })
            }
        };

        if sink.send(message).await.is_err() {
            debug!(line = line_no, "Feed consumer closed");
            return;
        }
    }
}
