//! Live detection feed.
//!
//! A single task owns the push-channel connection and a small state machine
//! deciding when to reconnect. Parsed events are handed to the consumer,
//! which keeps the bounded "latest detections" view in [`LiveEvents`].

use crate::error::Error;
use crate::types::DetectionEvent;
use futures::future::{Fuse, FutureExt};
use futures::{SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::delay_for;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Ten previous detections plus the newest one.
pub const FEED_CAPACITY: usize = 11;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Which pushed detections make it into the live list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFilter {
    All,
    RegisteredOnly,
}

impl FeedFilter {
    pub fn admits(self, event: &DetectionEvent) -> bool {
        match self {
            FeedFilter::All => true,
            FeedFilter::RegisteredOnly => event.is_registered(),
        }
    }
}

impl Default for FeedFilter {
    fn default() -> Self {
        FeedFilter::All
    }
}

impl FromStr for FeedFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FeedFilter::All),
            "registered" | "registered-only" => Ok(FeedFilter::RegisteredOnly),
            _ => Err(Error::Config {
                key: "PLATE_FEED_FILTER",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Open,
    Retrying,
    Closed,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FeedState::Connecting => "connecting",
            FeedState::Open => "live",
            FeedState::Retrying => "reconnecting",
            FeedState::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Connected,
    ConnectFailed,
    Disconnected,
    RetryElapsed,
    TeardownRequested,
}

/// Reconnection policy: a fixed delay, no backoff, no attempt cap.
/// `Closed` is absorbing, so nothing reconnects after a teardown.
#[derive(Debug, Clone)]
pub struct Reconnector {
    state: FeedState,
    delay: Duration,
}

impl Reconnector {
    pub fn new(delay: Duration) -> Self {
        Reconnector {
            state: FeedState::Connecting,
            delay,
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn handle(&mut self, signal: Signal) -> FeedState {
        use FeedState::*;
        use Signal::*;
        self.state = match (self.state, signal) {
            (Closed, _) => Closed,
            (_, TeardownRequested) => Closed,
            (Connecting, Connected) => Open,
            (Connecting, ConnectFailed) => Retrying,
            (Open, Disconnected) => Retrying,
            (Retrying, RetryElapsed) => Connecting,
            (state, signal) => {
                debug!("Ignoring {:?} while {:?}", signal, state);
                state
            }
        };
        self.state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    State(FeedState),
    Event(DetectionEvent),
}

/// The "latest detections" view: newest first, at most [`FEED_CAPACITY`].
#[derive(Debug, Clone)]
pub struct LiveEvents {
    filter: FeedFilter,
    events: VecDeque<DetectionEvent>,
    selected: Option<DetectionEvent>,
    state: FeedState,
}

impl LiveEvents {
    pub fn new(filter: FeedFilter) -> Self {
        LiveEvents {
            filter,
            events: VecDeque::with_capacity(FEED_CAPACITY),
            selected: None,
            state: FeedState::Connecting,
        }
    }

    /// Adds a pushed detection if the filter admits it. The accepted event
    /// becomes the selected one.
    pub fn push(&mut self, event: DetectionEvent) -> bool {
        if !self.filter.admits(&event) {
            info!(
                "Observed {} plate {}, not shown in live list",
                event.status, event.plate_number
            );
            return false;
        }
        self.prepend(event);
        true
    }

    /// Adds the result of a manual check. Manual checks bypass the filter.
    pub fn push_manual(&mut self, event: DetectionEvent) {
        self.prepend(event);
    }

    pub fn apply(&mut self, update: FeedUpdate) -> bool {
        match update {
            FeedUpdate::State(state) => {
                self.state = state;
                false
            }
            FeedUpdate::Event(event) => self.push(event),
        }
    }

    fn prepend(&mut self, event: DetectionEvent) {
        self.selected = Some(event.clone());
        self.events.push_front(event);
        self.events.truncate(FEED_CAPACITY);
    }

    pub fn events(&self) -> impl Iterator<Item = &DetectionEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest(&self) -> Option<&DetectionEvent> {
        self.events.front()
    }

    pub fn selected(&self) -> Option<&DetectionEvent> {
        self.selected.as_ref()
    }

    /// Selects the event at `index` (0 is newest).
    pub fn select(&mut self, index: usize) -> Option<&DetectionEvent> {
        let event = self.events.get(index)?.clone();
        self.selected = Some(event);
        self.selected.as_ref()
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn filter(&self) -> FeedFilter {
        self.filter
    }
}

/// Owner side of a running feed. Dropping it tears the feed down.
#[derive(Debug)]
pub struct FeedHandle {
    teardown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Requests an intentional teardown and waits for the connection and any
    /// pending retry to be released.
    pub async fn teardown(mut self) {
        if let Some(tx) = self.teardown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Detection feed task failed: {}", e);
            }
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.teardown.take() {
            let _ = tx.send(());
        }
    }
}

/// Starts the feed driver on the current runtime.
pub fn spawn(
    url: Url,
    reconnect_delay: Duration,
) -> (FeedHandle, mpsc::UnboundedReceiver<FeedUpdate>) {
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let (teardown_tx, teardown_rx) = oneshot::channel();
    let driver = Driver {
        url,
        machine: Reconnector::new(reconnect_delay),
        updates: updates_tx,
        teardown: teardown_rx.fuse(),
    };
    let task = tokio::spawn(driver.run());
    let handle = FeedHandle {
        teardown: Some(teardown_tx),
        task: Some(task),
    };
    (handle, updates_rx)
}

/// Parses one push-channel text message. Malformed messages are logged and
/// yield `None`; they never affect the connection.
pub fn parse_message(text: &str) -> Option<DetectionEvent> {
    match DetectionEvent::parse(text) {
        Ok(event) => {
            info!("Detection {} ({})", event.plate_number, event.status);
            Some(event)
        }
        Err(e) => {
            error!("Discarding malformed detection message {:?}: {}", text, e);
            None
        }
    }
}

struct Driver {
    url: Url,
    machine: Reconnector,
    updates: mpsc::UnboundedSender<FeedUpdate>,
    teardown: Fuse<oneshot::Receiver<()>>,
}

impl Driver {
    async fn run(mut self) {
        self.publish(FeedUpdate::State(self.machine.state()));
        loop {
            let signal = match self.machine.state() {
                FeedState::Closed => break,
                FeedState::Retrying => self.wait_to_retry().await,
                FeedState::Connecting | FeedState::Open => self.connect_and_read().await,
            };
            self.apply(signal);
        }
        info!("Detection feed closed");
    }

    fn apply(&mut self, signal: Signal) {
        let before = self.machine.state();
        let after = self.machine.handle(signal);
        if after != before && !self.publish(FeedUpdate::State(after)) {
            self.machine.handle(Signal::TeardownRequested);
        }
    }

    /// Returns false once the consumer has gone away.
    fn publish(&mut self, update: FeedUpdate) -> bool {
        self.updates.send(update).is_ok()
    }

    async fn wait_to_retry(&mut self) -> Signal {
        let delay = self.machine.delay();
        info!("Waiting {:?} and reconnecting to detection feed...", delay);
        tokio::select! {
            _ = &mut self.teardown => Signal::TeardownRequested,
            _ = delay_for(delay) => Signal::RetryElapsed,
        }
    }

    async fn connect_and_read(&mut self) -> Signal {
        info!("Connecting to detection feed at {}", self.url);
        let connect = tokio_tungstenite::connect_async(self.url.clone());
        let result = tokio::select! {
            _ = &mut self.teardown => return Signal::TeardownRequested,
            result = connect => result,
        };
        let mut ws = match result {
            Ok((ws, _)) => ws,
            Err(e) => {
                error!("Error connecting to detection feed: {}", e);
                return Signal::ConnectFailed;
            }
        };
        info!("Detection feed connected");
        self.apply(Signal::Connected);
        let signal = if self.machine.state() == FeedState::Closed {
            Signal::TeardownRequested
        } else {
            self.read_events(&mut ws).await
        };
        if signal == Signal::TeardownRequested {
            if let Err(e) = SinkExt::close(&mut ws).await {
                debug!("Error closing detection feed: {}", e);
            }
        }
        signal
    }

    async fn read_events<S>(&mut self, ws: &mut S) -> Signal
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            let message = tokio::select! {
                _ = &mut self.teardown => return Signal::TeardownRequested,
                message = ws.next() => message,
            };
            // Errors in individual messages are logged and ignored; only the
            // connection going away ends the read loop.
            match message {
                Some(Ok(Message::Text(text))) => {
                    if !self.handle_text(&text) {
                        return Signal::TeardownRequested;
                    }
                }
                Some(Ok(Message::Close(close_frame))) => {
                    warn!("Detection feed close message: {:?}", close_frame);
                    return Signal::Disconnected;
                }
                Some(Ok(other)) => debug!("Ignoring websocket message: {:?}", other),
                Some(Err(e)) => {
                    error!("Detection feed error: {}", e);
                    return Signal::Disconnected;
                }
                None => {
                    info!("Detection feed connection dropped");
                    return Signal::Disconnected;
                }
            }
        }
    }

    fn handle_text(&mut self, text: &str) -> bool {
        match parse_message(text) {
            Some(event) => self.publish(FeedUpdate::Event(event)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlateStatus;
    use chrono::{TimeZone, Utc};

    fn event(plate: &str, status: PlateStatus) -> DetectionEvent {
        DetectionEvent {
            plate_number: plate.to_string(),
            status,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            vehicle: None,
        }
    }

    #[test]
    fn newest_event_is_first_and_list_is_bounded() {
        let mut live = LiveEvents::new(FeedFilter::All);
        for i in 0..30 {
            let plate = format!("ABC{:04}", i);
            assert!(live.push(event(&plate, PlateStatus::Registered)));
            assert_eq!(live.latest().unwrap().plate_number, plate);
            assert!(live.len() <= FEED_CAPACITY);
        }
        assert_eq!(live.len(), FEED_CAPACITY);
        let plates: Vec<_> = live.events().map(|e| e.plate_number.as_str()).collect();
        assert_eq!(plates.first(), Some(&"ABC0029"));
        assert_eq!(plates.last(), Some(&"ABC0019"));
    }

    #[test]
    fn pushed_json_then_malformed_json() {
        let raw = r#"{"plate_number":"ABC1234","status":"registered","timestamp":"2024-01-01T00:00:00Z"}"#;
        let mut live = LiveEvents::new(FeedFilter::All);
        let expected = parse_message(raw).unwrap();
        assert!(live.push(expected.clone()));
        assert_eq!(live.latest(), Some(&expected));
        assert_eq!(live.selected(), Some(&expected));

        assert!(parse_message("{not json").is_none());
        assert!(parse_message(r#"{"plate_number":"ABC1234"}"#).is_none());
        assert_eq!(live.len(), 1);
        assert_eq!(live.latest(), Some(&expected));
    }

    #[test]
    fn registered_only_filter_hides_unregistered_pushes() {
        let mut live = LiveEvents::new(FeedFilter::RegisteredOnly);
        assert!(live.push(event("ABC1234", PlateStatus::Registered)));
        assert!(!live.push(event("ZZZ9999", PlateStatus::Unregistered)));
        assert_eq!(live.len(), 1);
        assert_eq!(live.selected().unwrap().plate_number, "ABC1234");

        live.push_manual(event("ZZZ9999", PlateStatus::Unregistered));
        assert_eq!(live.latest().unwrap().plate_number, "ZZZ9999");
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn select_by_index() {
        let mut live = LiveEvents::new(FeedFilter::All);
        live.push(event("AAA111", PlateStatus::Registered));
        live.push(event("BBB222", PlateStatus::Unregistered));
        assert_eq!(live.select(1).unwrap().plate_number, "AAA111");
        assert!(live.select(5).is_none());
        assert_eq!(live.selected().unwrap().plate_number, "AAA111");
    }

    #[test]
    fn updates_track_connection_state() {
        let mut live = LiveEvents::new(FeedFilter::All);
        assert!(!live.apply(FeedUpdate::State(FeedState::Open)));
        assert_eq!(live.state(), FeedState::Open);
        assert!(live.apply(FeedUpdate::Event(event("ABC1234", PlateStatus::Registered))));
        assert_eq!(live.len(), 1);
    }

    #[test]
    fn unsolicited_closures_retry_forever() {
        let mut machine = Reconnector::new(DEFAULT_RECONNECT_DELAY);
        assert_eq!(machine.handle(Signal::ConnectFailed), FeedState::Retrying);
        for _ in 0..100 {
            assert_eq!(machine.handle(Signal::RetryElapsed), FeedState::Connecting);
            assert_eq!(machine.handle(Signal::ConnectFailed), FeedState::Retrying);
        }
        machine.handle(Signal::RetryElapsed);
        assert_eq!(machine.handle(Signal::Connected), FeedState::Open);
        assert_eq!(machine.handle(Signal::Disconnected), FeedState::Retrying);
        assert_eq!(machine.delay(), Duration::from_secs(3));
    }

    #[test]
    fn teardown_is_absorbing() {
        for start in &[Signal::Connected, Signal::ConnectFailed] {
            let mut machine = Reconnector::new(DEFAULT_RECONNECT_DELAY);
            machine.handle(*start);
            assert_eq!(machine.handle(Signal::TeardownRequested), FeedState::Closed);
            for signal in &[
                Signal::Disconnected,
                Signal::ConnectFailed,
                Signal::RetryElapsed,
                Signal::Connected,
            ] {
                assert_eq!(machine.handle(*signal), FeedState::Closed);
            }
        }
    }

    #[test]
    fn out_of_order_signals_are_ignored() {
        let mut machine = Reconnector::new(DEFAULT_RECONNECT_DELAY);
        assert_eq!(machine.handle(Signal::RetryElapsed), FeedState::Connecting);
        assert_eq!(machine.handle(Signal::Disconnected), FeedState::Connecting);
        machine.handle(Signal::Connected);
        assert_eq!(machine.handle(Signal::Connected), FeedState::Open);
    }

    #[test]
    fn filter_names() {
        assert_eq!("all".parse::<FeedFilter>().unwrap(), FeedFilter::All);
        assert_eq!(
            " Registered ".parse::<FeedFilter>().unwrap(),
            FeedFilter::RegisteredOnly
        );
        assert!("unregistered".parse::<FeedFilter>().is_err());
    }
}
