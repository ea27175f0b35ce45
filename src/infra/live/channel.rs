//! Push channel client.
//!
//! Keeps one websocket connection to the server, reconnecting with backoff until closed.
//! Every decoded mutation invalidates the whole cache; mutations by other actors are
//! also reported to the `NotificationSink`.

use std::fmt;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use metrics::counter;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use crate::application::notify::NotificationSink;
use crate::cache::CacheStore;
use crate::config::Settings;
use crate::domain::{ActorId, MutationEvent};

use super::backoff::ReconnectPolicy;
use super::codec::decode_event;

const METRIC_LIVE_EVENTS: &str = "leadcast_live_events_total";
const METRIC_LIVE_DECODE_ERRORS: &str = "leadcast_live_decode_errors_total";
const METRIC_LIVE_RECONNECTS: &str = "leadcast_live_reconnects_total";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Reconnecting => "reconnecting",
            ChannelState::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("invalid push channel request: {0}")]
    InvalidUrl(String),
    #[error("failed to connect to push channel: {0}")]
    Connect(String),
    #[error("push channel transport error: {0}")]
    Transport(String),
}

/// Connection parameters of a `LiveChannel`.
#[derive(Debug, Clone)]
pub struct LiveChannelConfig {
    pub url: Url,
    pub token: Option<String>,
    /// Events caused by this actor invalidate the cache but raise no notification.
    pub local_actor: Option<ActorId>,
    pub reconnect: ReconnectPolicy,
}

impl LiveChannelConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            token: None,
            local_actor: None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_local_actor(mut self, actor: ActorId) -> Self {
        self.local_actor = Some(actor);
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl From<&Settings> for LiveChannelConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            url: settings.live.url.clone(),
            token: settings.api.token.clone(),
            local_actor: settings.session.actor_id.clone(),
            reconnect: ReconnectPolicy::from(&settings.live),
        }
    }
}

/// Handle of a running `LiveChannel` task.
pub struct LiveChannelHandle {
    state: watch::Receiver<ChannelState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LiveChannelHandle {
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Receiver of every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Stop reconnecting, close the connection and wait for the task to finish.
    pub async fn close(self) {
        self.shutdown.send_replace(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "Live channel task ended abnormally");
        }
    }
}

enum ConnectionEnd {
    Shutdown,
    Lost(ChannelError),
}

/// Push channel client feeding a `CacheStore`.
pub struct LiveChannel {
    config: LiveChannelConfig,
    store: Arc<CacheStore>,
    sink: Arc<dyn NotificationSink>,
    state: watch::Sender<ChannelState>,
}

impl LiveChannel {
    /// Start the channel on the current tokio runtime.
    pub fn spawn(
        config: LiveChannelConfig,
        store: Arc<CacheStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> LiveChannelHandle {
        let (state, state_rx) = watch::channel(ChannelState::Disconnected);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let channel = Self {
            config,
            store,
            sink,
            state,
        };
        let task = tokio::spawn(channel.run(shutdown_rx));
        LiveChannelHandle {
            state: state_rx,
            shutdown,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let policy = self.config.reconnect;
        let mut failures: u32 = 0;
        let mut reported = false;

        loop {
            self.transition(ChannelState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = wait_shutdown(&mut shutdown) => break,
                connected = self.connect() => connected,
            };

            let error = match connected {
                Ok(socket) => {
                    failures = 0;
                    reported = false;
                    self.transition(ChannelState::Connected);
                    info!(url = %self.config.url, "Live channel connected");
                    match self.pump(socket, &mut shutdown).await {
                        ConnectionEnd::Shutdown => break,
                        ConnectionEnd::Lost(error) => {
                            warn!(error = %error, "Live channel connection lost");
                            error
                        }
                    }
                }
                Err(error) => {
                    failures = failures.saturating_add(1);
                    warn!(error = %error, failures, "Live channel connect attempt failed");
                    error
                }
            };

            if !reported && policy.should_report(failures) {
                self.sink.channel_unavailable(&error);
                reported = true;
            }

            self.transition(ChannelState::Reconnecting);
            counter!(METRIC_LIVE_RECONNECTS).increment(1);
            let delay = policy.delay(failures);
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnecting");
            tokio::select! {
                biased;
                _ = wait_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(ChannelState::Closed);
        info!("Live channel closed");
    }

    async fn connect(&self) -> Result<Socket, ChannelError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| ChannelError::InvalidUrl(err.to_string()))?;

        if let Some(token) = self.config.token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| ChannelError::InvalidUrl(format!("invalid token header: {err}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|err| ChannelError::Connect(err.to_string()))?;
        Ok(socket)
    }

    async fn pump(&self, socket: Socket, shutdown: &mut watch::Receiver<bool>) -> ConnectionEnd {
        let (mut sender, mut receiver) = socket.split();

        loop {
            let incoming = tokio::select! {
                biased;
                _ = wait_shutdown(shutdown) => {
                    if let Err(err) = sender.send(Message::Close(None)).await {
                        debug!(error = %err, "Failed to send close frame");
                    }
                    return ConnectionEnd::Shutdown;
                }
                incoming = receiver.next() => incoming,
            };

            match incoming {
                Some(Ok(Message::Text(text))) => self.apply_frame(text.as_bytes()),
                Some(Ok(Message::Binary(bytes))) => self.apply_frame(&bytes),
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(err) = sender.send(Message::Pong(payload)).await {
                        return ConnectionEnd::Lost(ChannelError::Transport(err.to_string()));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.into_owned())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "no reason".to_string());
                    return ConnectionEnd::Lost(ChannelError::Transport(format!(
                        "closed by server: {reason}"
                    )));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    return ConnectionEnd::Lost(ChannelError::Transport(err.to_string()));
                }
                None => {
                    return ConnectionEnd::Lost(ChannelError::Transport(
                        "stream ended".to_string(),
                    ));
                }
            }
        }
    }

    fn apply_frame(&self, payload: &[u8]) {
        match decode_event(payload) {
            Ok(event) => self.apply_event(&event),
            Err(err) => {
                warn!(error = %err, bytes = payload.len(), "Dropping undecodable push frame");
                counter!(METRIC_LIVE_DECODE_ERRORS).increment(1);
            }
        }
    }

    fn apply_event(&self, event: &MutationEvent) {
        let invalidated = self.store.invalidate_all();
        let foreign = self
            .config
            .local_actor
            .as_ref()
            .is_none_or(|local| !event.is_from(local));
        let origin = if foreign { "foreign" } else { "self" };
        counter!(METRIC_LIVE_EVENTS, "origin" => origin).increment(1);
        debug!(
            event = event.event_type.as_str(),
            actor = %event.actor_id,
            record = event.record_id.as_deref(),
            origin,
            invalidated,
            "Applied push event"
        );

        if foreign {
            let label = if event.actor_label.is_empty() {
                event.actor_id.as_str()
            } else {
                event.actor_label.as_str()
            };
            self.sink.mutation(event.event_type, label);
        }
    }

    fn transition(&self, next: ChannelState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Live channel state changed");
        }
    }
}

/// Resolves once shutdown was requested. A dropped sender never requests shutdown.
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
