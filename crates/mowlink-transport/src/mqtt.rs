// ============================================
// File: crates/mowlink-transport/src/mqtt.rs
// ============================================
//! # MQTT Broker Link
//!
//! ## Creation Reason
//! Owns the single MQTT connection to the platform broker: derives
//! credentials, keeps the rumqttc event loop running, re-subscribes and
//! re-binds after every reconnect, and forwards inbound publishes.
//!
//! ## Main Functionality
//! - `MqttBroker::connect()`: builds options and spawns the event loop
//! - Bind on every ConnAck; `Ready` on bind reply or bind timeout
//! - Automatic reconnect with capped exponential backoff and jitter
//! - `Broker` implementation for publish / token swap / disconnect
//!
//! ## Link Lifecycle
//! ```text
//!             ConnAck                bind_reply | bind timeout
//! Disconnected ──────► Connected ──────────────────────────► Ready
//!      ▲                   │                                  │
//!      └───────────────────┴──────── poll error ──────────────┘
//!                                  (backoff, then rumqttc reconnects)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `connect()` must be called inside a Tokio runtime
//! - Subscribes and the bind publish use `try_*` because they run on
//!   the event loop task itself; an awaited request there could block
//!   on the request channel the loop is supposed to drain
//! - Commands in flight during a reconnect are not replayed
//!
//! ## Last Modified
//! v0.1.0 - Initial broker link

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mowlink_common::types::DeviceIdentity;

use crate::credentials::BrokerCredentials;
use crate::error::{Result, TransportError};
use crate::topics::Topics;
use crate::traits::{Broker, BrokerEvent, BrokerSettings, LinkState};

// ============================================
// Constants
// ============================================

/// Largest packet accepted in either direction.
const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Time allowed for the event loop to stop after disconnect.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds the bind message associating `iot_token` with this client.
#[must_use]
pub fn bind_payload(username: &str, iot_token: &str) -> Vec<u8> {
    json!({
        "id": "msgid1",
        "version": "1.0",
        "request": { "clientId": username },
        "params": { "iotToken": iot_token },
    })
    .to_string()
    .into_bytes()
}

// ============================================
// Backoff
// ============================================

/// Reconnect delay generator.
#[derive(Debug, Clone)]
struct Backoff {
    initial_ms: u64,
    current_ms: u64,
    max_ms: u64,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        let initial_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX).max(1);
        Self {
            initial_ms,
            current_ms: initial_ms,
            max_ms: u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(initial_ms),
        }
    }

    /// Next delay: doubles up to the cap, ±25% jitter.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current_ms;
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        let jitter = delay / 4;
        let offset = rand::thread_rng().gen_range(0..=jitter * 2);
        Duration::from_millis(delay - jitter + offset)
    }

    fn reset(&mut self) {
        self.current_ms = self.initial_ms;
    }
}

// ============================================
// Shared Link State
// ============================================

/// State shared between the handle and the event loop task.
struct LinkShared {
    state: RwLock<LinkState>,
    iot_token: RwLock<String>,
    username: String,
    topics: Topics,
}

impl LinkShared {
    fn set_state(&self, state: LinkState) {
        *self.state.write() = state;
    }

    fn bind_message(&self) -> Vec<u8> {
        bind_payload(&self.username, &self.iot_token.read())
    }
}

// ============================================
// MqttBroker
// ============================================

/// Live MQTT link to the platform broker.
pub struct MqttBroker {
    client: AsyncClient,
    shared: Arc<LinkShared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBroker {
    /// Derives credentials and starts the link.
    ///
    /// Returns the handle and the receiver for link events. The link
    /// connects in the background; watch for [`BrokerEvent::Ready`].
    ///
    /// # Errors
    /// Returns an error for invalid settings or an incomplete identity.
    pub fn connect(
        settings: &BrokerSettings,
        identity: &DeviceIdentity,
        iot_token: impl Into<String>,
    ) -> Result<(Self, mpsc::Receiver<BrokerEvent>)> {
        settings.validate()?;
        let credentials = BrokerCredentials::generate(identity, &settings.cloud_client_id)?;
        let host = settings.host_for(&identity.product_key);

        info!(
            host = %host,
            port = settings.port,
            product_key = %identity.product_key,
            device_name = %identity.device_name,
            "Connecting to broker"
        );

        let mut options = MqttOptions::new(credentials.client_id.clone(), host, settings.port);
        options.set_credentials(credentials.username.clone(), credentials.password.clone());
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        if settings.tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, eventloop) = AsyncClient::new(options, settings.channel_capacity);
        let (events_tx, events_rx) = mpsc::channel(settings.channel_capacity);

        let shared = Arc::new(LinkShared {
            state: RwLock::new(LinkState::Disconnected),
            iot_token: RwLock::new(iot_token.into()),
            username: credentials.username,
            topics: Topics::new(&identity.product_key, &identity.device_name),
        });
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            Arc::clone(&shared),
            events_tx,
            Backoff::new(settings.backoff_initial, settings.backoff_max),
            settings.bind_timeout,
            cancel.clone(),
        ));

        Ok((
            Self {
                client,
                shared,
                cancel,
                task: Mutex::new(Some(task)),
            },
            events_rx,
        ))
    }

    /// Topic names used by this link.
    #[must_use]
    pub fn topics(&self) -> &Topics {
        &self.shared.topics
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::ShuttingDown);
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::publish_failed(topic, e))
    }

    fn set_iot_token(&self, token: String) {
        *self.shared.iot_token.write() = token;

        if self.state().is_up() {
            let topic = self.shared.topics.bind();
            match self
                .client
                .try_publish(&topic, QoS::AtLeastOnce, false, self.shared.bind_message())
            {
                Ok(()) => debug!(topic = %topic, "Re-bound with refreshed token"),
                Err(e) => warn!(topic = %topic, error = %e, "Failed to queue re-bind"),
            }
        }
    }

    fn state(&self) -> LinkState {
        *self.shared.state.read()
    }

    async fn disconnect(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "Disconnect request not queued");
        }
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                warn!("Broker event loop did not stop in time");
            }
        }

        self.shared.set_state(LinkState::Disconnected);
        info!("Broker link closed");
        Ok(())
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================
// Event Loop
// ============================================

async fn emit(events: &mpsc::Sender<BrokerEvent>, event: BrokerEvent) {
    if events.send(event).await.is_err() {
        debug!("Broker event receiver dropped");
    }
}

/// Subscribes every downlink topic and publishes the bind message.
fn subscribe_and_bind(client: &AsyncClient, shared: &LinkShared) {
    for topic in shared.topics.subscriptions() {
        if let Err(e) = client.try_subscribe(&topic, QoS::AtLeastOnce) {
            warn!(topic = %topic, error = %e, "Failed to queue subscribe");
        }
    }

    let bind = shared.topics.bind();
    if let Err(e) = client.try_publish(&bind, QoS::AtLeastOnce, false, shared.bind_message()) {
        warn!(topic = %bind, error = %e, "Failed to queue bind");
    }
}

fn log_bind_reply(payload: &[u8]) {
    let code = serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|doc| doc.get("code").and_then(serde_json::Value::as_i64));
    match code {
        Some(200) => info!("Bind acknowledged"),
        other => warn!(code = ?other, "Bind reply without success code"),
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    shared: Arc<LinkShared>,
    events: mpsc::Sender<BrokerEvent>,
    mut backoff: Backoff,
    bind_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut bind_deadline: Option<Instant> = None;

    loop {
        let deadline = bind_deadline;
        let bind_wait = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Broker event loop cancelled");
                break;
            }

            () = bind_wait => {
                bind_deadline = None;
                if *shared.state.read() == LinkState::Connected {
                    warn!(timeout = ?bind_timeout, "No bind reply, treating link as ready");
                    shared.set_state(LinkState::Ready);
                    emit(&events, BrokerEvent::Ready).await;
                }
            }

            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to broker");
                    backoff.reset();
                    shared.set_state(LinkState::Connected);
                    subscribe_and_bind(&client, &shared);
                    bind_deadline = Some(Instant::now() + bind_timeout);
                    emit(&events, BrokerEvent::Connected).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if shared.topics.is_bind_reply(&publish.topic) {
                        log_bind_reply(&publish.payload);
                        if *shared.state.read() == LinkState::Connected {
                            bind_deadline = None;
                            shared.set_state(LinkState::Ready);
                            emit(&events, BrokerEvent::Ready).await;
                        }
                    }
                    emit(&events, BrokerEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    }).await;
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!("Subscription acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    let was_up = shared.state.read().is_up();
                    shared.set_state(LinkState::Disconnected);
                    bind_deadline = None;

                    let delay = backoff.next_delay();
                    warn!(error = %e, retry_in = ?delay, "Broker connection error");
                    if was_up {
                        emit(&events, BrokerEvent::Disconnected { reason: e.to_string() }).await;
                    }

                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    shared.set_state(LinkState::Disconnected);
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use mowlink_common::types::DeviceSecret;

    #[test]
    fn test_bind_payload() {
        let payload = bind_payload("dn&pk", "tok-1");
        let doc: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(doc["request"]["clientId"], "dn&pk");
        assert_eq!(doc["params"]["iotToken"], "tok-1");
        assert_eq!(doc["version"], "1.0");
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(400));
        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(75) && first <= Duration::from_millis(125));

        backoff.next_delay();
        backoff.next_delay();
        let capped = backoff.next_delay();
        assert!(capped <= Duration::from_millis(500));
        assert!(capped >= Duration::from_millis(300));

        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(125));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_settings() {
        let identity = DeviceIdentity::new("pk", "dn", DeviceSecret::new("s"));
        let settings = BrokerSettings::default();
        assert!(MqttBroker::connect(&settings, &identity, "tok").is_err());
    }

    #[tokio::test]
    async fn test_disconnect_before_connack() {
        let identity = DeviceIdentity::new("pk", "dn", DeviceSecret::new("s"));
        let settings = BrokerSettings::new("r", "C1")
            .with_host("127.0.0.1")
            .with_port(1)
            .with_tls(false);
        let (broker, _events) = MqttBroker::connect(&settings, &identity, "tok").unwrap();
        assert_eq!(broker.state(), LinkState::Disconnected);

        broker.disconnect().await.unwrap();
        assert_eq!(broker.state(), LinkState::Disconnected);
        assert!(matches!(
            broker.publish("/t", vec![1]).await,
            Err(TransportError::ShuttingDown)
        ));
    }
}
