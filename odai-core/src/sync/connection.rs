//! The relay connection manager.
//!
//! Owns the one logical WebSocket to the relay. The connection heals itself:
//! a clean close is retried after a short delay, a failed connect after a
//! longer one, and nothing is retried while the page is hidden. Becoming
//! visible again reopens whatever was suspended.
//!
//! State changes go through [`transition`], a pure function over
//! ([`ConnectionState`], [`LinkEvent`], [`Visibility`]) that returns the
//! next state and the [`Effect`] the manager must carry out. The manager
//! itself only does I/O and bookkeeping around it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::error::SyncError;
use super::frame::Frame;
use super::handlers::{HandlerId, HandlerRegistry};
use super::protocol::ControlMessage;
use super::scheduler::ScheduledTask;
use crate::channel_id::ChannelId;

/// Delay before reconnecting after a clean close.
pub const CLOSE_RETRY_DELAY: Duration = Duration::from_millis(100);
/// Delay before reconnecting after a failed connection attempt.
pub const ERROR_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Lifecycle of the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Closed,
    Opening,
    Open,
}

/// Whether the hosting page is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEvent {
    /// `open()` was called
    OpenRequested,
    /// The WebSocket handshake completed
    TransportOpened,
    /// The socket closed
    TransportClosed,
    /// The socket failed
    TransportError,
}

/// What the manager must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Start a new connection attempt
    Connect,
    /// The connection is usable; replay the subscription
    Ready,
    /// Reconnect after the given delay
    Retry(Duration),
    /// Stay closed until the page becomes visible
    Suspend,
}

/// Reconnect delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after a clean close
    pub close_delay: Duration,
    /// Delay after a failed connection attempt
    pub error_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            close_delay: CLOSE_RETRY_DELAY,
            error_delay: ERROR_RETRY_DELAY,
        }
    }
}

/// Computes the next connection state and the effect to carry out.
///
/// An error on an open socket is ignored because a close always follows it;
/// an error while opening means the attempt failed and is retried after the
/// longer error delay.
pub fn transition(
    state: ConnectionState,
    event: LinkEvent,
    visibility: Visibility,
    policy: &RetryPolicy,
) -> (ConnectionState, Effect) {
    use ConnectionState::{Closed, Open, Opening};

    let retry_after = |delay| match visibility {
        Visibility::Visible => Effect::Retry(delay),
        Visibility::Hidden => Effect::Suspend,
    };

    match (state, event) {
        (Closed, LinkEvent::OpenRequested) => (Opening, Effect::Connect),
        (Opening, LinkEvent::TransportOpened) => (Open, Effect::Ready),
        (Opening | Open, LinkEvent::TransportClosed) => (Closed, retry_after(policy.close_delay)),
        (Opening, LinkEvent::TransportError) => (Closed, retry_after(policy.error_delay)),
        (state, _) => (state, Effect::None),
    }
}

struct Link {
    state: ConnectionState,
    visibility: Visibility,
    /// Most recently requested channel; replayed on every open
    target: ChannelId,
    /// Bumped per connection attempt so stale events can be told apart
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    retry: Option<ScheduledTask>,
    session: Option<JoinHandle<()>>,
    shut_down: bool,
}

struct Inner {
    endpoint: String,
    policy: RetryPolicy,
    handlers: HandlerRegistry,
    link: Mutex<Link>,
    state_tx: watch::Sender<ConnectionState>,
    connect_attempts: AtomicU64,
}

/// Handle to the relay connection.
///
/// Cheap to clone; all clones share one connection. Must be used from
/// within a Tokio runtime. Call [`Self::shutdown`] to stop reconnecting.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager for the given WebSocket endpoint. Nothing is
    /// connected until [`Self::open`] is called.
    pub fn new(endpoint: impl Into<String>, policy: RetryPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Closed);

        Self {
            inner: Arc::new(Inner {
                endpoint: endpoint.into(),
                policy,
                handlers: HandlerRegistry::new(),
                link: Mutex::new(Link {
                    state: ConnectionState::Closed,
                    visibility: Visibility::Visible,
                    target: ChannelId::empty(),
                    generation: 0,
                    outbound: None,
                    retry: None,
                    session: None,
                    shut_down: false,
                }),
                state_tx,
                connect_attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Inbound frame handlers.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.handlers
    }

    pub fn add_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.inner.handlers.add(handler)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.handlers.remove(id)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Watches connection state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn visibility(&self) -> Visibility {
        self.lock().visibility
    }

    /// The channel replayed whenever the connection opens.
    pub fn target(&self) -> ChannelId {
        self.lock().target.clone()
    }

    /// Number of physical connection attempts started so far.
    pub fn connect_attempts(&self) -> u64 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    /// Starts connecting unless a connection is already open or opening.
    ///
    /// Returns true if a new attempt was started.
    pub fn open(&self) -> bool {
        let mut link = self.lock();
        if link.shut_down {
            return false;
        }

        if self.apply(&mut link, LinkEvent::OpenRequested) != Effect::Connect {
            return false;
        }

        link.retry = None;
        link.generation += 1;
        let generation = link.generation;
        let attempt = self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(endpoint = %self.inner.endpoint, attempt, "Opening relay connection");

        link.session = Some(tokio::spawn(self.clone().run_session(generation)));
        true
    }

    /// Records the channel to subscribe to.
    ///
    /// If the connection is open the subscribe message goes out right away,
    /// so switching channels never needs a reconnect. The empty id clears
    /// the target without sending anything. Returns true if a subscribe
    /// message was sent.
    pub fn subscribe(&self, id: ChannelId) -> bool {
        let mut link = self.lock();
        link.target = id;

        if link.state != ConnectionState::Open || link.target.is_empty() {
            return false;
        }

        let Some(outbound) = link.outbound.as_ref() else {
            return false;
        };

        match emit_subscribe(outbound, &link.target) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(channel = %link.target, "Subscribe failed: {}", e);
                false
            }
        }
    }

    /// Queues a frame on the open connection.
    ///
    /// Fails with [`SyncError::NotConnected`] unless the connection is open;
    /// nothing is queued for later.
    pub fn try_send(&self, frame: Frame) -> Result<(), SyncError> {
        let link = self.lock();
        let outbound = match (link.state, link.outbound.as_ref()) {
            (ConnectionState::Open, Some(outbound)) => outbound,
            _ => return Err(SyncError::NotConnected),
        };

        let bytes = frame.len();
        outbound
            .send(Message::Binary(frame.into_bytes().into()))
            .map_err(|_| SyncError::NotConnected)?;
        tracing::debug!(bytes, "Frame sent");
        Ok(())
    }

    /// Sends a frame if the connection is open, otherwise drops it.
    ///
    /// A dropped frame is superseded by the next stroke's frame.
    pub fn send(&self, frame: Frame) -> bool {
        match self.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Dropping frame: {}", e);
                false
            }
        }
    }

    /// Reports page visibility.
    ///
    /// Hiding the page only stops future retries. Coming back to the
    /// foreground calls [`Self::open`], which revives a suspended connection.
    pub fn set_visibility(&self, visibility: Visibility) {
        let previous = {
            let mut link = self.lock();
            std::mem::replace(&mut link.visibility, visibility)
        };

        if previous == Visibility::Hidden && visibility == Visibility::Visible {
            tracing::debug!("Page visible");
            self.open();
        }
    }

    /// Closes the connection for good and cancels any pending retry.
    ///
    /// Anything still queued for the relay is discarded; use [`Self::close`]
    /// to flush it first.
    pub fn shutdown(&self) {
        let mut link = self.lock();
        if let Some(session) = link.session.take() {
            session.abort();
        }
        self.shut_down(&mut link);
    }

    /// Like [`Self::shutdown`], but an open connection first writes out
    /// everything already queued and then closes cleanly.
    pub async fn close(&self) {
        let session = {
            let mut link = self.lock();
            let session = link.session.take();
            self.shut_down(&mut link);
            session
        };

        if let Some(session) = session {
            let _ = session.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn shut_down(&self, link: &mut Link) {
        if std::mem::replace(&mut link.shut_down, true) {
            return;
        }
        link.retry = None;
        // Dropping the sender ends the session loop once the queue drains
        link.outbound = None;
        if link.state != ConnectionState::Closed {
            link.state = ConnectionState::Closed;
            self.inner.state_tx.send_replace(ConnectionState::Closed);
        }
        tracing::info!(endpoint = %self.inner.endpoint, "Relay connection shut down");
    }

    fn apply(&self, link: &mut Link, event: LinkEvent) -> Effect {
        let (next, effect) = transition(link.state, event, link.visibility, &self.inner.policy);
        if next != link.state {
            tracing::debug!(from = ?link.state, to = ?next, ?event, "Connection state changed");
            link.state = next;
            self.inner.state_tx.send_replace(next);
        }
        effect
    }

    /// Feeds a transport event from the session with the given generation.
    fn on_event(&self, generation: u64, event: LinkEvent) {
        let mut link = self.lock();
        if link.generation != generation || link.shut_down {
            return;
        }

        let effect = self.apply(&mut link, event);
        if link.state == ConnectionState::Closed {
            link.outbound = None;
        }

        match effect {
            Effect::Retry(delay) => {
                tracing::info!(?event, ?delay, "Relay connection lost, retrying");
                link.retry = Some(self.schedule_open(delay));
            }
            Effect::Suspend => {
                tracing::info!(?event, "Relay connection lost while hidden, suspended");
            }
            _ => {}
        }
    }

    /// Marks the session open. The subscribe message is queued before the
    /// outbound queue becomes visible to `send`, so it always precedes any
    /// frame on this connection.
    fn on_opened(&self, generation: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let mut link = self.lock();
        if link.generation != generation || link.shut_down {
            return false;
        }

        if self.apply(&mut link, LinkEvent::TransportOpened) != Effect::Ready {
            return false;
        }
        tracing::info!(endpoint = %self.inner.endpoint, "Relay connection open");

        if !link.target.is_empty() {
            if let Err(e) = emit_subscribe(&outbound, &link.target) {
                tracing::warn!(channel = %link.target, "Subscribe failed: {}", e);
            }
        }

        link.outbound = Some(outbound);
        true
    }

    fn schedule_open(&self, delay: Duration) -> ScheduledTask {
        let inner = Arc::downgrade(&self.inner);
        ScheduledTask::after(delay, move || {
            if let Some(inner) = inner.upgrade() {
                ConnectionManager { inner }.open();
            }
        })
    }

    /// Drives one physical connection from connect to close.
    async fn run_session(self, generation: u64) {
        let ws_stream = match connect_async(self.inner.endpoint.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                let err = SyncError::ConnectionError(e.to_string());
                tracing::warn!(endpoint = %self.inner.endpoint, "{}", err);
                self.on_event(generation, LinkEvent::TransportError);
                return;
            }
        };

        let (mut sender, mut receiver) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        if !self.on_opened(generation, outbound_tx) {
            let _ = sender.send(Message::Close(None)).await;
            return;
        }

        loop {
            tokio::select! {
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Binary(data))) => {
                        let frame = Frame::from(data.to_vec());
                        let delivered = self.inner.handlers.dispatch(&frame);
                        tracing::debug!(bytes = frame.len(), handlers = delivered, "Frame received");
                    }
                    Some(Ok(Message::Text(_))) => {
                        // Reserved for relay-to-client control messages
                        tracing::trace!("Ignoring text message from relay");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite
                    }
                    Some(Err(e)) => {
                        tracing::warn!("{}", SyncError::WebSocketError(e.to_string()));
                        self.on_event(generation, LinkEvent::TransportError);
                        break;
                    }
                },
                outgoing = outbound_rx.recv() => match outgoing {
                    Some(msg) => {
                        if let Err(e) = sender.send(msg).await {
                            tracing::warn!("{}", SyncError::WebSocketError(e.to_string()));
                            self.on_event(generation, LinkEvent::TransportError);
                            break;
                        }
                    }
                    None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
            }
        }

        self.on_event(generation, LinkEvent::TransportClosed);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn emit_subscribe(
    outbound: &mpsc::UnboundedSender<Message>,
    id: &ChannelId,
) -> Result<(), SyncError> {
    let text = ControlMessage::set_canvas(id).encode()?;
    outbound
        .send(Message::Text(text.into()))
        .map_err(|_| SyncError::NotConnected)?;
    tracing::info!(channel = %id, "Subscribed to channel");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_for_state, Received, Relay};
    use tokio::sync::mpsc::error::TryRecvError;

    use ConnectionState::{Closed, Open, Opening};

    const EVENTS: [LinkEvent; 4] = [
        LinkEvent::OpenRequested,
        LinkEvent::TransportOpened,
        LinkEvent::TransportClosed,
        LinkEvent::TransportError,
    ];

    fn set_canvas(id: &str) -> Received {
        Received::Control(format!(r#"{{"type":"set_canvas","canvas_id":"{}"}}"#, id))
    }

    fn all_sequences(len: usize) -> Vec<Vec<(LinkEvent, Visibility)>> {
        let steps: Vec<(LinkEvent, Visibility)> = EVENTS
            .iter()
            .flat_map(|e| [(*e, Visibility::Visible), (*e, Visibility::Hidden)])
            .collect();

        let mut sequences = vec![Vec::new()];
        for _ in 0..len {
            sequences = sequences
                .into_iter()
                .flat_map(|seq| {
                    steps.iter().map(move |step| {
                        let mut next = seq.clone();
                        next.push(*step);
                        next
                    })
                })
                .collect();
        }
        sequences
    }

    #[test]
    fn test_transitions_follow_lifecycle() {
        let policy = RetryPolicy::default();

        for sequence in all_sequences(5) {
            let mut state = Closed;
            for (event, visibility) in sequence {
                let (next, effect) = transition(state, event, visibility, &policy);

                let allowed = next == state
                    || matches!(
                        (state, next),
                        (Closed, Opening) | (Opening, Open) | (Open, Closed) | (Opening, Closed)
                    );
                assert!(allowed, "{:?} -> {:?} on {:?}", state, next, event);

                // Only a closed connection may start a new attempt
                if effect == Effect::Connect {
                    assert_eq!(state, Closed);
                    assert_eq!(next, Opening);
                }

                state = next;
            }
        }
    }

    #[test]
    fn test_open_is_idempotent() {
        let policy = RetryPolicy::default();
        for state in [Opening, Open] {
            let result = transition(state, LinkEvent::OpenRequested, Visibility::Visible, &policy);
            assert_eq!(result, (state, Effect::None));
        }
    }

    #[test]
    fn test_close_retries_quickly_when_visible() {
        let policy = RetryPolicy::default();
        let result = transition(Open, LinkEvent::TransportClosed, Visibility::Visible, &policy);
        assert_eq!(result, (Closed, Effect::Retry(Duration::from_millis(100))));
    }

    #[test]
    fn test_close_suspends_when_hidden() {
        let policy = RetryPolicy::default();
        let result = transition(Open, LinkEvent::TransportClosed, Visibility::Hidden, &policy);
        assert_eq!(result, (Closed, Effect::Suspend));
    }

    #[test]
    fn test_failed_connect_backs_off_longer() {
        let policy = RetryPolicy::default();
        let result = transition(Opening, LinkEvent::TransportError, Visibility::Visible, &policy);
        assert_eq!(result, (Closed, Effect::Retry(Duration::from_millis(1000))));
    }

    #[test]
    fn test_error_while_hidden_suspends() {
        let policy = RetryPolicy::default();
        let result = transition(Opening, LinkEvent::TransportError, Visibility::Hidden, &policy);
        assert_eq!(result, (Closed, Effect::Suspend));

        // An error on an open socket still waits for the close
        let result = transition(Open, LinkEvent::TransportError, Visibility::Hidden, &policy);
        assert_eq!(result, (Open, Effect::None));
    }

    #[test]
    fn test_error_on_open_socket_waits_for_close() {
        let policy = RetryPolicy::default();
        for state in [Open, Closed] {
            let result = transition(state, LinkEvent::TransportError, Visibility::Visible, &policy);
            assert_eq!(result, (state, Effect::None));
        }
    }

    #[test]
    fn test_send_while_closed_is_dropped() {
        let manager = ConnectionManager::new("ws://127.0.0.1:9/ws", RetryPolicy::default());

        assert!(!manager.send(Frame::from(vec![1, 2, 3])));
        assert!(matches!(
            manager.try_send(Frame::from(vec![1])),
            Err(SyncError::NotConnected)
        ));
        assert_eq!(manager.state(), Closed);
    }

    #[test]
    fn test_subscribe_while_closed_only_records_target() {
        let manager = ConnectionManager::new("ws://127.0.0.1:9/ws", RetryPolicy::default());

        assert!(!manager.subscribe(ChannelId::new("abc123")));
        assert_eq!(manager.target(), ChannelId::new("abc123"));
    }

    #[tokio::test]
    async fn test_open_starts_one_attempt() {
        // Nothing listens on the discard port, so the attempt fails and a
        // retry is scheduled a second later.
        let manager = ConnectionManager::new("ws://127.0.0.1:9/ws", RetryPolicy::default());

        assert!(manager.open());
        assert!(!manager.open());
        assert!(!manager.open());
        assert_eq!(manager.connect_attempts(), 1);

        manager.shutdown();
        assert_eq!(manager.state(), Closed);
        assert!(!manager.open());
    }

    #[tokio::test]
    async fn test_subscription_precedes_frames() {
        let relay = Relay::start().await;
        let manager = ConnectionManager::new(relay.endpoint(), RetryPolicy::default());
        manager.subscribe(ChannelId::new("abc123"));

        manager.open();
        wait_for_state(&manager, Open).await;
        assert!(manager.send(Frame::from(vec![7, 7, 7])));

        relay.wait_until("frame", |r| r.received(0).len() == 2).await;
        assert_eq!(
            relay.received(0),
            vec![set_canvas("abc123"), Received::Frame(vec![7, 7, 7])]
        );

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_empty_target_is_not_announced() {
        let relay = Relay::start().await;
        let manager = ConnectionManager::new(relay.endpoint(), RetryPolicy::default());

        manager.open();
        wait_for_state(&manager, Open).await;
        assert!(!manager.subscribe(ChannelId::empty()));
        manager.send(Frame::from(vec![1]));

        relay.wait_until("frame", |r| !r.received(0).is_empty()).await;
        assert_eq!(relay.received(0), vec![Received::Frame(vec![1])]);

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_switching_channel_reuses_connection() {
        let relay = Relay::start().await;
        let manager = ConnectionManager::new(relay.endpoint(), RetryPolicy::default());
        manager.subscribe(ChannelId::new("first"));

        manager.open();
        wait_for_state(&manager, Open).await;
        assert!(manager.subscribe(ChannelId::new("second")));

        relay.wait_until("resubscribe", |r| r.received(0).len() == 2).await;
        assert_eq!(
            relay.received(0),
            vec![set_canvas("first"), set_canvas("second")]
        );
        assert_eq!(relay.connections(), 1);
        assert_eq!(manager.connect_attempts(), 1);

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_reconnects_and_replays_subscription() {
        let relay = Relay::start().await;
        let manager = ConnectionManager::new(relay.endpoint(), RetryPolicy::default());
        manager.subscribe(ChannelId::new("abc123"));

        manager.open();
        wait_for_state(&manager, Open).await;
        relay.wait_until("subscribe", |r| r.subscribers("abc123") == 1).await;

        relay.drop_all();
        relay.wait_until("reconnect", |r| r.connections() == 2).await;
        wait_for_state(&manager, Open).await;

        relay.wait_until("replay", |r| !r.received(1).is_empty()).await;
        assert_eq!(relay.received(1), vec![set_canvas("abc123")]);
        assert_eq!(manager.connect_attempts(), 2);

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_hidden_drop_suspends_until_visible() {
        let relay = Relay::start().await;
        let manager = ConnectionManager::new(relay.endpoint(), RetryPolicy::default());
        manager.subscribe(ChannelId::new("abc123"));

        manager.open();
        wait_for_state(&manager, Open).await;
        manager.set_visibility(Visibility::Hidden);

        relay.drop_all();
        wait_for_state(&manager, Closed).await;

        // Well past the close retry delay
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(manager.connect_attempts(), 1);
        assert_eq!(manager.state(), Closed);

        manager.set_visibility(Visibility::Visible);
        assert_eq!(manager.connect_attempts(), 2);
        wait_for_state(&manager, Open).await;

        relay.wait_until("replay", |r| !r.received(1).is_empty()).await;
        assert_eq!(relay.received(1), vec![set_canvas("abc123")]);
        assert_eq!(manager.connect_attempts(), 2);

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_hidden_failed_connect_waits_for_visible() {
        let policy = RetryPolicy {
            close_delay: Duration::from_millis(50),
            error_delay: Duration::from_millis(50),
        };
        let manager = ConnectionManager::new("ws://127.0.0.1:9/ws", policy);
        manager.set_visibility(Visibility::Hidden);

        assert!(manager.open());
        wait_for_state(&manager, Closed).await;

        // Many error delays later, still only the first attempt
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(manager.connect_attempts(), 1);
        assert_eq!(manager.state(), Closed);

        manager.set_visibility(Visibility::Visible);
        assert_eq!(manager.connect_attempts(), 2);

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_frames_fan_out_to_handlers() {
        let relay = Relay::start().await;
        let sender = ConnectionManager::new(relay.endpoint(), RetryPolicy::default());
        let receiver = ConnectionManager::new(relay.endpoint(), RetryPolicy::default());

        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        let first = receiver.add_handler(move |frame: &Frame| {
            let _ = first_tx.send(frame.clone());
        });
        receiver.add_handler(move |frame: &Frame| {
            let _ = second_tx.send(frame.clone());
        });

        for manager in [&sender, &receiver] {
            manager.subscribe(ChannelId::new("shared"));
            manager.open();
            wait_for_state(manager, Open).await;
        }
        relay.wait_until("subscribers", |r| r.subscribers("shared") == 2).await;

        sender.send(Frame::from(vec![1]));
        let got = tokio::time::timeout(Duration::from_secs(5), first_rx.recv()).await;
        assert_eq!(got.ok().flatten(), Some(Frame::from(vec![1])));
        let got = tokio::time::timeout(Duration::from_secs(5), second_rx.recv()).await;
        assert_eq!(got.ok().flatten(), Some(Frame::from(vec![1])));

        assert!(receiver.remove_handler(first));
        sender.send(Frame::from(vec![2]));
        sender.send(Frame::from(vec![3]));

        for expected in [vec![2], vec![3]] {
            let got = tokio::time::timeout(Duration::from_secs(5), second_rx.recv()).await;
            assert_eq!(got.ok().flatten(), Some(Frame::from(expected)));
        }
        assert!(first_rx.try_recv().is_err());

        sender.shutdown();
        receiver.shutdown();
    }

    #[tokio::test]
    async fn test_close_flushes_queued_frames() {
        let relay = Relay::start().await;
        let manager = ConnectionManager::new(relay.endpoint(), RetryPolicy::default());
        manager.subscribe(ChannelId::new("abc123"));
        manager.open();
        wait_for_state(&manager, Open).await;

        for byte in 1..=3u8 {
            assert!(manager.send(Frame::from(vec![byte])));
        }
        manager.close().await;

        relay.wait_until("frames", |r| r.received(0).len() == 4).await;
        assert_eq!(
            relay.received(0)[1..],
            [
                Received::Frame(vec![1]),
                Received::Frame(vec![2]),
                Received::Frame(vec![3]),
            ]
        );
        assert_eq!(manager.state(), Closed);
        assert!(!manager.open());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(relay.connections(), 1);
    }

    #[tokio::test]
    async fn test_text_from_relay_is_ignored() {
        let relay = Relay::start().await;
        let manager = ConnectionManager::new(relay.endpoint(), RetryPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.add_handler(move |frame: &Frame| {
            let _ = tx.send(frame.clone());
        });
        manager.subscribe(ChannelId::new("abc123"));
        manager.open();
        wait_for_state(&manager, Open).await;
        relay.wait_until("subscribe", |r| r.subscribers("abc123") == 1).await;

        relay.send_text(r#"{"type":"hello"}"#);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(manager.state(), Open);

        manager.shutdown();
    }
}
