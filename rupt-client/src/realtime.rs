//! Realtime revocation channel
//!
//! A server-sent-events subscription keyed by device id. The only meaningful
//! payload is the JSON string `"logout"`; everything else on the stream
//! (comments, other events, open/close/error transitions) is ignored.
//!
//! At most one subscription is live per channel: `start` always tears down the
//! previous one before spawning the next.

use crate::transport::require_credentials;
use crate::wire::paths;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use rupt_core::{network_error, Credentials, RealtimeConfig, RuptResult};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub type ByteStream = BoxStream<'static, RuptResult<Vec<u8>>>;

/// Opens the raw byte stream behind a subscription URL
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, url: &str) -> RuptResult<ByteStream>;
}

/// `reqwest` streaming connector. No request timeout: the stream is long-lived.
#[derive(Debug, Clone)]
pub struct HttpStreamConnector {
    client: reqwest::Client,
}

impl HttpStreamConnector {
    pub fn new() -> RuptResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rupt-rust/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| network_error!("failed to create streaming client", "realtime", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StreamConnector for HttpStreamConnector {
    async fn connect(&self, url: &str) -> RuptResult<ByteStream> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| network_error!("failed to open event stream", "realtime", e))?;

        let response = response
            .error_for_status()
            .map_err(|e| network_error!("event stream rejected", "realtime", e))?;

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| network_error!("event stream interrupted", "realtime", e))
            })
            .boxed())
    }
}

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Longest line the parser buffers. Anything longer is discarded up to its
/// line end.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Incremental `text/event-stream` parser
///
/// Lines end with CRLF, LF or a bare CR, and a CRLF split across two chunks
/// still counts as a single line end.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    data: Vec<String>,
    event: Option<String>,
    after_cr: bool,
    overflowed: bool,
}

impl SseParser {
    /// Feed a chunk; returns every event completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            let after_cr = std::mem::replace(&mut self.after_cr, byte == b'\r');
            match byte {
                b'\n' if after_cr => {}
                b'\n' | b'\r' => {
                    let raw = std::mem::take(&mut self.pending);
                    if std::mem::take(&mut self.overflowed) {
                        continue;
                    }
                    if let Some(event) = self.process_line(&String::from_utf8_lossy(&raw)) {
                        events.push(event);
                    }
                }
                _ if self.overflowed => {}
                _ if self.pending.len() >= MAX_LINE_BYTES => {
                    debug!(limit = MAX_LINE_BYTES, "Event stream line too long, discarding");
                    self.pending = Vec::new();
                    self.overflowed = true;
                }
                _ => self.pending.push(byte),
            }
        }

        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

/// Messages the channel understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeMessage {
    Logout,
}

impl RealtimeMessage {
    pub const LOGOUT_PAYLOAD: &'static str = "\"logout\"";

    pub fn parse(data: &str) -> Option<Self> {
        match data.trim() {
            Self::LOGOUT_PAYLOAD => Some(RealtimeMessage::Logout),
            _ => None,
        }
    }
}

/// Signal forwarded to the owner of the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeSignal {
    Logout { device_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

#[derive(Debug)]
struct SharedState {
    generation: u64,
    state: ChannelState,
}

struct ActiveSubscription {
    device_id: String,
    handle: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build the subscription URL: device id in the path, credentials in `auth`
pub fn listen_url(base_url: &str, device_id: &str, credentials: &Credentials) -> String {
    format!(
        "{}{}?auth={}",
        base_url.trim_end_matches('/'),
        paths::listen(device_id),
        urlencoding::encode(&credentials.authorization_value())
    )
}

pub struct RealtimeChannel {
    base_url: String,
    connector: Arc<dyn StreamConnector>,
    reconnect: RealtimeConfig,
    signals: mpsc::UnboundedSender<RealtimeSignal>,
    shared: Arc<Mutex<SharedState>>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl RealtimeChannel {
    pub fn new(
        base_url: impl Into<String>,
        connector: Arc<dyn StreamConnector>,
        reconnect: RealtimeConfig,
        signals: mpsc::UnboundedSender<RealtimeSignal>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            connector,
            reconnect: reconnect.clamped(),
            signals,
            shared: Arc::new(Mutex::new(SharedState {
                generation: 0,
                state: ChannelState::Closed,
            })),
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.shared).state
    }

    /// Device id of the live subscription, if any
    pub fn active_device_id(&self) -> Option<String> {
        lock(&self.active).as_ref().map(|a| a.device_id.clone())
    }

    /// Subscribe for `device_id`, superseding any live subscription.
    ///
    /// Without credentials or a device id this is a no-op and returns `false`.
    /// Must be called inside a Tokio runtime.
    pub fn start(&self, credentials: Option<&Credentials>, device_id: Option<&str>) -> bool {
        let (Ok(credentials), Some(device_id)) = (
            require_credentials(credentials),
            device_id.filter(|id| !id.is_empty()),
        ) else {
            debug!("Realtime channel not started: client id or device id missing");
            return false;
        };

        self.stop();

        let url = listen_url(&self.base_url, device_id, credentials);
        let generation = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.state = ChannelState::Connecting;
            shared.generation
        };

        let task = SubscriptionTask {
            url,
            device_id: device_id.to_string(),
            generation,
            connector: self.connector.clone(),
            reconnect: self.reconnect,
            signals: self.signals.clone(),
            shared: self.shared.clone(),
        };
        let handle = tokio::spawn(task.run());

        info!(device_id, "Realtime channel started");
        *lock(&self.active) = Some(ActiveSubscription {
            device_id: device_id.to_string(),
            handle,
        });
        true
    }

    /// Tear down the live subscription. Idempotent.
    pub fn stop(&self) {
        if let Some(active) = lock(&self.active).take() {
            active.handle.abort();
            info!(device_id = %active.device_id, "Realtime channel stopped");
        }
        let mut shared = lock(&self.shared);
        shared.generation += 1;
        shared.state = ChannelState::Closed;
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(active) = lock(&self.active).take() {
            active.handle.abort();
        }
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("base_url", &self.base_url)
            .field("state", &self.state())
            .field("active_device_id", &self.active_device_id())
            .finish_non_exhaustive()
    }
}

struct SubscriptionTask {
    url: String,
    device_id: String,
    generation: u64,
    connector: Arc<dyn StreamConnector>,
    reconnect: RealtimeConfig,
    signals: mpsc::UnboundedSender<RealtimeSignal>,
    shared: Arc<Mutex<SharedState>>,
}

impl SubscriptionTask {
    /// Only the current generation may move the state
    fn set_state(&self, state: ChannelState) {
        let mut shared = lock(&self.shared);
        if shared.generation == self.generation {
            shared.state = state;
        }
    }

    fn next_delay(&self, delay_ms: u64) -> u64 {
        let jitter = (fastrand::f64() - 0.5) * 0.2;
        let jittered = ((delay_ms as f64) * (1.0 + jitter)) as u64;
        jittered
            .min(self.reconnect.reconnect_max_delay_ms)
            .max(RealtimeConfig::MIN_RECONNECT_DELAY_MS)
    }

    async fn run(self) {
        let mut delay_ms = self.reconnect.reconnect_initial_delay_ms;

        loop {
            self.set_state(ChannelState::Connecting);

            match self.connector.connect(&self.url).await {
                Ok(mut stream) => {
                    self.set_state(ChannelState::Open);
                    delay_ms = self.reconnect.reconnect_initial_delay_ms;
                    let mut parser = SseParser::default();

                    while let Some(chunk) = stream.next().await {
                        let chunk = match chunk {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                debug!(
                                    device_id = %self.device_id,
                                    error = %e,
                                    "Event stream error"
                                );
                                break;
                            }
                        };
                        for event in parser.feed(&chunk) {
                            let message = RealtimeMessage::parse(&event.data);
                            if message != Some(RealtimeMessage::Logout) {
                                continue;
                            }
                            info!(device_id = %self.device_id, "Logout received");
                            let signal = RealtimeSignal::Logout {
                                device_id: self.device_id.clone(),
                            };
                            if self.signals.send(signal).is_err() {
                                debug!("Signal receiver dropped, ending subscription");
                                return;
                            }
                        }
                    }
                    debug!(device_id = %self.device_id, "Event stream ended");
                }
                Err(e) => {
                    debug!(
                        device_id = %self.device_id,
                        error = %e,
                        "Event stream connect failed"
                    );
                }
            }

            if self.signals.is_closed() {
                return;
            }
            self.set_state(ChannelState::Connecting);
            let pause = std::time::Duration::from_millis(self.next_delay(delay_ms));
            tokio::time::sleep(pause).await;
            delay_ms = delay_ms
                .saturating_mul(2)
                .min(self.reconnect.reconnect_max_delay_ms);
        }
    }
}
