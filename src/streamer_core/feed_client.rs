//! Long-lived feed session with reconnect
//!
//! ```text
//!   Disconnected ──start/failure──▶ Connecting ──directives sent──▶ Subscribed
//!        ▲                              ▲                               │
//!        │ connect failed               │ backoff elapsed               │ transport error /
//!        └──────────────────────────────┴──────── Degraded ◀────────────┘ missed heartbeat
//! ```
//!
//! The upstream feed is push-only with no replay. Anything broadcast while the
//! client is Degraded or Connecting is lost; callers must treat gaps across a
//! reconnect as normal.

use crate::config::FeedConfig;
use crate::streamer_core::error_handler::ExponentialBackoff;
use crate::streamer_core::subscription::{Directive, SubscriptionSet};
use crate::streamer_core::transport::{Connector, Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, timeout, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Degraded,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Degraded => "degraded",
        }
    }
}

/// A decoded inbound frame: `{"op": ..., "x": {...}}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawMessage {
    pub op: String,
    #[serde(default)]
    pub x: Option<serde_json::Value>,
    #[serde(default)]
    pub addr: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Carries a transaction or block payload
    Event,
    /// Keepalive replies and subscription echoes
    Control,
    Unknown,
}

impl RawMessage {
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    pub fn kind(&self) -> FrameKind {
        match self.op.as_str() {
            "utx" | "block" => FrameKind::Event,
            "pong" | "ping" | "status" | "unconfirmed_sub" | "blocks_sub" | "addr_sub"
            | "addr_unsub" => FrameKind::Control,
            _ => FrameKind::Unknown,
        }
    }
}

#[derive(Debug)]
enum Command {
    AddAddress(String),
    RemoveAddress(String),
}

/// Control side of a feed session, safe to clone across tasks.
///
/// Dropping every handle is treated as a shutdown request.
#[derive(Clone)]
pub struct FeedHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: Arc<watch::Sender<bool>>,
    state: watch::Receiver<ConnectionState>,
}

impl FeedHandle {
    /// Subscribe to one more address without reconnecting. The address is
    /// replayed on every later reconnect. Returns false once the client is gone.
    pub fn add_address(&self, address: &str) -> bool {
        self.commands
            .send(Command::AddAddress(address.to_string()))
            .is_ok()
    }

    /// Stop an address subscription without reconnecting. It is not replayed
    /// on later reconnects. Returns false once the client is gone.
    pub fn remove_address(&self, address: &str) -> bool {
        self.commands
            .send(Command::RemoveAddress(address.to_string()))
            .is_ok()
    }

    /// Cooperative cancellation: aborts a pending backoff wait and closes
    /// the transport. A message already handed out is unaffected.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

enum Step {
    Shutdown,
    Command(Command),
    Frame(Option<Result<String, TransportError>>),
    HeartbeatMissed,
    PingDue,
}

pub struct FeedClient {
    connector: Box<dyn Connector>,
    config: FeedConfig,
    subscriptions: SubscriptionSet,
    backoff: ExponentialBackoff,
    transport: Option<Box<dyn Transport>>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    commands: mpsc::UnboundedReceiver<Command>,
    pending_backoff: bool,
    session_started: Option<Instant>,
    last_frame: Instant,
    next_ping: Instant,
    sessions_opened: u64,
    dropped_frames: u64,
}

impl FeedClient {
    /// Set up a session. Nothing touches the network until the first
    /// `next_message` call.
    pub fn connect(
        connector: Box<dyn Connector>,
        config: FeedConfig,
        subscriptions: SubscriptionSet,
    ) -> (FeedClient, FeedHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let now = Instant::now();

        let client = FeedClient {
            connector,
            backoff: ExponentialBackoff::new(&config.backoff),
            config,
            subscriptions,
            transport: None,
            state_tx,
            shutdown_rx,
            commands: command_rx,
            pending_backoff: false,
            session_started: None,
            last_frame: now,
            next_ping: now,
            sessions_opened: 0,
            dropped_frames: 0,
        };

        let handle = FeedHandle {
            commands: command_tx,
            shutdown: Arc::new(shutdown_tx),
            state: state_rx,
        };

        (client, handle)
    }

    /// Next transaction/block message from the feed.
    ///
    /// Reconnects transparently on transport failure or missed heartbeat.
    /// Returns `None` only after shutdown; the transport is closed by then.
    pub async fn next_message(&mut self) -> Option<RawMessage> {
        loop {
            if self.shutdown_requested() {
                self.close().await;
                return None;
            }

            if self.transport.is_none() {
                if !self.establish().await {
                    self.close().await;
                    return None;
                }
                continue;
            }

            match self.poll_step().await {
                Step::Shutdown => {
                    self.close().await;
                    return None;
                }
                Step::Command(Command::AddAddress(address)) => self.apply_add_address(address).await,
                Step::Command(Command::RemoveAddress(address)) => {
                    self.apply_remove_address(address).await
                }
                Step::PingDue => self.send_ping().await,
                Step::HeartbeatMissed => {
                    let silence = self.config.heartbeat_timeout;
                    self.degrade(format!("no frame for {:?}", silence)).await
                }
                Step::Frame(None) => self.degrade(TransportError::Closed.to_string()).await,
                Step::Frame(Some(Err(e))) => self.degrade(e.to_string()).await,
                Step::Frame(Some(Ok(text))) => {
                    self.last_frame = Instant::now();
                    if let Some(message) = self.decode(&text) {
                        return Some(message);
                    }
                }
            }
        }
    }

    /// Tear down the transport. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            match timeout(self.config.handshake_timeout, transport.close()).await {
                Ok(Ok(())) => log::info!("🔌 Feed transport closed"),
                Ok(Err(e)) => log::debug!("Feed transport close error: {}", e),
                Err(_) => log::debug!("Feed transport close timed out"),
            }
        }
        self.session_started = None;
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Frames thrown away for bad JSON or unrecognized ops
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened
    }

    pub fn backoff_attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow() || self.shutdown_rx.has_changed().is_err()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            log::info!("🔄 Feed state: {} → {}", current.as_str(), next.as_str());
            *current = next;
            true
        });
    }

    /// Disconnected/Degraded → Connecting → Subscribed. Returns false when
    /// shutdown interrupted the attempt.
    async fn establish(&mut self) -> bool {
        if self.pending_backoff {
            let delay = self.backoff.next_delay();
            log::warn!(
                "⏳ Reconnect attempt {} in {}ms",
                self.backoff.attempt(),
                delay.as_millis()
            );
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown_rx) => return false,
                _ = sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Connecting);

        let opened = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut self.shutdown_rx) => return false,
            result = open_session(self.connector.as_ref(), &self.subscriptions) => result,
        };

        match opened {
            Ok(transport) => {
                let now = Instant::now();
                self.transport = Some(transport);
                self.sessions_opened += 1;
                self.session_started = Some(now);
                self.last_frame = now;
                self.next_ping = now + self.config.ping_interval;
                self.pending_backoff = false;
                self.set_state(ConnectionState::Subscribed);
                log::info!(
                    "✅ Subscribed to feed (session #{}, {} directives)",
                    self.sessions_opened,
                    self.subscriptions.directives().len()
                );
            }
            Err(e) => {
                log::error!("❌ Feed connection failed: {}", e);
                self.pending_backoff = true;
                self.set_state(ConnectionState::Disconnected);
            }
        }

        true
    }

    async fn poll_step(&mut self) -> Step {
        let Some(transport) = self.transport.as_mut() else {
            return Step::Frame(None);
        };
        let heartbeat_deadline = self.last_frame + self.config.heartbeat_timeout;
        let ping_at = self.next_ping;

        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut self.shutdown_rx) => Step::Shutdown,
            Some(command) = self.commands.recv() => Step::Command(command),
            frame = transport.recv_text() => Step::Frame(frame),
            _ = sleep_until(heartbeat_deadline) => Step::HeartbeatMissed,
            _ = sleep_until(ping_at) => Step::PingDue,
        }
    }

    /// Subscribed → Degraded. The next loop iteration waits out the backoff.
    async fn degrade(&mut self, reason: String) {
        log::warn!("⚠️  Feed degraded: {}", reason);
        self.set_state(ConnectionState::Degraded);

        if let Some(mut transport) = self.transport.take() {
            let _ = timeout(self.config.handshake_timeout, transport.close()).await;
        }

        if let Some(started) = self.session_started.take() {
            if started.elapsed() >= self.config.backoff.stability_period {
                self.backoff.reset();
            }
        }

        self.pending_backoff = true;
    }

    async fn apply_add_address(&mut self, address: String) {
        if !self.subscriptions.add_address(&address) {
            log::debug!("Address {} already subscribed", address);
            return;
        }

        let Some(transport) = self.transport.as_mut() else {
            // Picked up by the directive replay on the next connect
            return;
        };

        let directive = Directive::AddrSub { addr: address.clone() };
        let result = match directive.to_frame() {
            Ok(frame) => transport.send_text(frame).await,
            Err(e) => Err(TransportError::Protocol(e.to_string())),
        };

        match result {
            Ok(()) => log::info!("📡 Subscribed to address: {}", address),
            Err(e) => self.degrade(e.to_string()).await,
        }
    }

    async fn apply_remove_address(&mut self, address: String) {
        if !self.subscriptions.remove_address(&address) {
            log::debug!("Address {} was not subscribed", address);
            return;
        }

        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        let directive = Directive::AddrUnsub { addr: address.clone() };
        let result = match directive.to_frame() {
            Ok(frame) => transport.send_text(frame).await,
            Err(e) => Err(TransportError::Protocol(e.to_string())),
        };

        match result {
            Ok(()) => log::info!("📴 Unsubscribed from address: {}", address),
            // The reconnect leaves it out of the replay anyway
            Err(e) => self.degrade(e.to_string()).await,
        }
    }

    async fn send_ping(&mut self) {
        self.next_ping = Instant::now() + self.config.ping_interval;

        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        let result = match Directive::Ping.to_frame() {
            Ok(frame) => transport.send_text(frame).await,
            Err(e) => Err(TransportError::Protocol(e.to_string())),
        };

        if let Err(e) = result {
            self.degrade(e.to_string()).await;
        }
    }

    fn decode(&mut self, text: &str) -> Option<RawMessage> {
        let message = match RawMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                self.dropped_frames += 1;
                log::warn!("⚠️  Discarding undecodable frame: {}", e);
                return None;
            }
        };

        match message.kind() {
            FrameKind::Event => Some(message),
            FrameKind::Control => {
                log::debug!("Control frame: {}", message.op);
                None
            }
            FrameKind::Unknown => {
                self.dropped_frames += 1;
                log::warn!("⚠️  Discarding frame with unrecognized op '{}'", message.op);
                None
            }
        }
    }
}

async fn open_session(
    connector: &dyn Connector,
    subscriptions: &SubscriptionSet,
) -> Result<Box<dyn Transport>, TransportError> {
    log::info!("🔗 Connecting to feed: {}", connector.endpoint());
    let mut transport = connector.connect().await?;

    for directive in subscriptions.directives() {
        let sent = match directive.to_frame() {
            Ok(frame) => transport.send_text(frame).await,
            Err(e) => Err(TransportError::Protocol(e.to_string())),
        };
        if let Err(e) = sent {
            let _ = transport.close().await;
            return Err(e);
        }
        log::debug!("📡 Sent {:?}", directive);
    }

    Ok(transport)
}

/// Resolves once shutdown is requested or every handle is dropped
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    enum SessionEnd {
        Reset,
        Hold,
    }

    struct ScriptedSession {
        frames: Vec<String>,
        end: SessionEnd,
    }

    struct ScriptedConnector {
        sessions: Mutex<VecDeque<ScriptedSession>>,
        sent: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl ScriptedConnector {
        fn new(sessions: Vec<ScriptedSession>) -> (Self, Arc<Mutex<Vec<Vec<String>>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let connector = Self {
                sessions: Mutex::new(sessions.into()),
                sent: sent.clone(),
            };
            (connector, sent)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
            let session = self
                .sessions
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::Connection("connection refused".to_string()))?;

            let mut sent = self.sent.lock().unwrap();
            sent.push(Vec::new());

            Ok(Box::new(ScriptedTransport {
                frames: session.frames.into(),
                end: session.end,
                sent: self.sent.clone(),
                index: sent.len() - 1,
            }))
        }

        fn endpoint(&self) -> &str {
            "scripted://feed"
        }
    }

    struct ScriptedTransport {
        frames: VecDeque<String>,
        end: SessionEnd,
        sent: Arc<Mutex<Vec<Vec<String>>>>,
        index: usize,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.sent.lock().unwrap()[self.index].push(text);
            Ok(())
        }

        async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
            if let Some(frame) = self.frames.pop_front() {
                return Some(Ok(frame));
            }
            match self.end {
                SessionEnd::Reset => Some(Err(TransportError::Connection("reset by peer".to_string()))),
                SessionEnd::Hold => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn test_config(stability: Duration) -> FeedConfig {
        FeedConfig {
            ws_url: "ws://unused".to_string(),
            subscribe_unconfirmed: true,
            subscribe_blocks: true,
            backoff: BackoffConfig {
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                jitter: 0.0,
                stability_period: stability,
            },
            heartbeat_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(1),
        }
    }

    fn utx(hash: &str) -> String {
        format!(r#"{{"op":"utx","x":{{"hash":"{}"}}}}"#, hash)
    }

    fn hash_of(message: &RawMessage) -> &str {
        message.x.as_ref().unwrap()["hash"].as_str().unwrap()
    }

    fn subscriptions() -> SubscriptionSet {
        let mut set = SubscriptionSet::new(true, true);
        set.add_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
        set
    }

    #[tokio::test]
    async fn test_reconnect_resends_each_directive_once() {
        let (connector, sent) = ScriptedConnector::new(vec![
            ScriptedSession { frames: vec![utx("tx_1")], end: SessionEnd::Reset },
            ScriptedSession { frames: vec![utx("tx_2")], end: SessionEnd::Hold },
        ]);
        let (mut client, handle) = FeedClient::connect(
            Box::new(connector),
            test_config(Duration::from_secs(60)),
            subscriptions(),
        );

        let first = client.next_message().await.unwrap();
        assert_eq!(hash_of(&first), "tx_1");
        assert_eq!(handle.state(), ConnectionState::Subscribed);

        let second = client.next_message().await.unwrap();
        assert_eq!(hash_of(&second), "tx_2");
        assert_eq!(client.sessions_opened(), 2);

        let expected = vec![
            r#"{"op":"unconfirmed_sub"}"#.to_string(),
            r#"{"op":"blocks_sub"}"#.to_string(),
            r#"{"op":"addr_sub","addr":"1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"}"#.to_string(),
        ];
        let sent = sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], expected);
        assert_eq!(sent[1], expected);

        handle.shutdown();
        assert!(client.next_message().await.is_none());
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_frames_are_discarded() {
        let (connector, _sent) = ScriptedConnector::new(vec![ScriptedSession {
            frames: vec![
                r#"{"op":"mystery","x":{}}"#.to_string(),
                "definitely not json".to_string(),
                r#"{"op":"pong"}"#.to_string(),
                utx("tx_after_noise"),
            ],
            end: SessionEnd::Hold,
        }]);
        let (mut client, _handle) = FeedClient::connect(
            Box::new(connector),
            test_config(Duration::from_secs(60)),
            SubscriptionSet::new(true, false),
        );

        let message = client.next_message().await.unwrap();
        assert_eq!(hash_of(&message), "tx_after_noise");
        assert_eq!(client.dropped_frames(), 2);
    }

    #[tokio::test]
    async fn test_dynamic_address_survives_reconnect() {
        let (connector, sent) = ScriptedConnector::new(vec![
            ScriptedSession { frames: vec![utx("tx_1")], end: SessionEnd::Reset },
            ScriptedSession { frames: vec![utx("tx_2")], end: SessionEnd::Hold },
        ]);
        let (mut client, handle) = FeedClient::connect(
            Box::new(connector),
            test_config(Duration::from_secs(60)),
            SubscriptionSet::new(true, false),
        );

        assert!(handle.add_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"));
        client.next_message().await.unwrap();
        client.next_message().await.unwrap();

        let sent = sent.lock().unwrap().clone();
        let addr_sub = r#"{"op":"addr_sub","addr":"3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"}"#;
        // Sent live in the first session, replayed with the directives in the second
        assert_eq!(sent[0].iter().filter(|f| f.as_str() == addr_sub).count(), 1);
        assert_eq!(sent[1].iter().filter(|f| f.as_str() == addr_sub).count(), 1);
        assert_eq!(client.subscriptions().addresses().len(), 1);
    }

    #[tokio::test]
    async fn test_removed_address_unsubscribed_and_not_replayed() {
        let (connector, sent) = ScriptedConnector::new(vec![
            ScriptedSession { frames: vec![utx("tx_1"), utx("tx_2")], end: SessionEnd::Reset },
            ScriptedSession { frames: vec![utx("tx_3")], end: SessionEnd::Hold },
        ]);
        let (mut client, handle) = FeedClient::connect(
            Box::new(connector),
            test_config(Duration::from_secs(60)),
            subscriptions(),
        );

        client.next_message().await.unwrap();
        assert!(handle.remove_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        client.next_message().await.unwrap();
        client.next_message().await.unwrap();

        let sent = sent.lock().unwrap().clone();
        assert_eq!(
            sent[0].last().map(String::as_str),
            Some(r#"{"op":"addr_unsub","addr":"1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"}"#)
        );
        assert_eq!(
            sent[1],
            vec![
                r#"{"op":"unconfirmed_sub"}"#.to_string(),
                r#"{"op":"blocks_sub"}"#.to_string(),
            ]
        );
        assert!(client.subscriptions().addresses().is_empty());
    }

    #[tokio::test]
    async fn test_missed_heartbeat_degrades_and_reconnects() {
        let (connector, _sent) = ScriptedConnector::new(vec![
            ScriptedSession { frames: vec![], end: SessionEnd::Hold },
            ScriptedSession { frames: vec![utx("tx_fresh")], end: SessionEnd::Hold },
        ]);
        let mut config = test_config(Duration::from_secs(60));
        config.heartbeat_timeout = Duration::from_millis(50);
        let (mut client, _handle) =
            FeedClient::connect(Box::new(connector), config, SubscriptionSet::new(true, true));

        let message = tokio::time::timeout(Duration::from_secs(5), client.next_message())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hash_of(&message), "tx_fresh");
        assert_eq!(client.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_backoff_wait() {
        let (connector, _sent) = ScriptedConnector::new(vec![]);
        let mut config = test_config(Duration::from_secs(60));
        config.backoff.base_delay = Duration::from_secs(600);
        config.backoff.max_delay = Duration::from_secs(600);
        let (mut client, handle) =
            FeedClient::connect(Box::new(connector), config, SubscriptionSet::new(true, true));

        let task = tokio::spawn(async move { client.next_message().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("shutdown should interrupt the backoff sleep")
            .unwrap();
        assert!(result.is_none());
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stable_session_resets_backoff() {
        let sessions = || {
            vec![
                ScriptedSession { frames: vec![utx("a")], end: SessionEnd::Reset },
                ScriptedSession { frames: vec![utx("b")], end: SessionEnd::Reset },
                ScriptedSession { frames: vec![utx("c")], end: SessionEnd::Hold },
            ]
        };

        // Every session counts as stable: each reconnect starts from base again
        let (connector, _) = ScriptedConnector::new(sessions());
        let (mut client, _handle) = FeedClient::connect(
            Box::new(connector),
            test_config(Duration::ZERO),
            SubscriptionSet::new(true, false),
        );
        for _ in 0..3 {
            client.next_message().await.unwrap();
        }
        assert_eq!(client.backoff_attempt(), 1);

        // Blips shorter than the stability period keep growing the delay
        let (connector, _) = ScriptedConnector::new(sessions());
        let (mut client, _handle) = FeedClient::connect(
            Box::new(connector),
            test_config(Duration::from_secs(60)),
            SubscriptionSet::new(true, false),
        );
        for _ in 0..3 {
            client.next_message().await.unwrap();
        }
        assert_eq!(client.backoff_attempt(), 2);
    }

    #[test]
    fn test_frame_kinds() {
        let kind = |op: &str| RawMessage { op: op.to_string(), x: None, addr: None }.kind();
        assert_eq!(kind("utx"), FrameKind::Event);
        assert_eq!(kind("block"), FrameKind::Event);
        assert_eq!(kind("pong"), FrameKind::Control);
        assert_eq!(kind("addr_sub"), FrameKind::Control);
        assert_eq!(kind("surprise"), FrameKind::Unknown);
    }
}
