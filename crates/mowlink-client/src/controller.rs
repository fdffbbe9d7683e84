// ============================================
// File: crates/mowlink-client/src/controller.rs
// ============================================
//! # Controller
//!
//! ## Creation Reason
//! The handle a front end holds: it logs in, connects one device,
//! sends commands and exposes device events. Every collaborator is
//! constructed here and passed down explicitly; nothing is global.
//!
//! ## Main Functionality
//! - `Controller::login()`: full authentication chain and device choice
//! - `connect()` / `disconnect()`: one broker connection with its workers
//! - `send_motion()`, `stop()`, `queue_command()`: correlated commands
//! - `on_battery_changed()` etc.: typed subscriptions on the event bus
//!
//! ## Connection Lifecycle
//! ```text
//! connect()
//!   ├── refresh session
//!   ├── broker link (bind on connect)
//!   └── spawn ─┬─ dispatch worker   (broker events → router / bus)
//!              ├─ resync task       (BLE sync every resync interval)
//!              └─ refresh task      (token refresh + report config)
//! first Ready ─► BLE sync + report config
//! disconnect() ─► cancel token ─► fail in-flight ─► close link
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Each connection owns a fresh `CancellationToken`, correlator and
//!   pending queue; nothing survives a disconnect except device state
//! - Initial sync runs on its own task; the dispatch worker must stay
//!   free to deliver the replies it waits for
//!
//! ## Last Modified
//! v0.1.0 - Initial controller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mowlink_common::types::IotId;
use mowlink_core::protocol::DeviceCommand;
use mowlink_transport::{Broker, BrokerEvent, MqttBroker};

use crate::bus::{ClientEvent, EventBus, SubscriptionId};
use crate::cloud::{BoundDevice, CloudClient};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::services::account::AccountClient;
use crate::services::authority::SessionAuthority;
use crate::services::correlator::{CommandCorrelator, CommandSink, PendingQueue};
use crate::services::device_state::{DeviceState, DeviceStateModel, Position};
use crate::services::telemetry::TelemetryRouter;
use crate::tasks::{spawn_recurring, RefreshTask, ResyncTask};

/// Grace period for connection workers to stop.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================
// Connection
// ============================================

struct Connection {
    broker: Arc<dyn Broker>,
    correlator: CommandCorrelator,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

// ============================================
// Controller
// ============================================

/// Authenticated handle on one device.
pub struct Controller {
    config: ClientConfig,
    authority: Arc<SessionAuthority>,
    sink: Arc<dyn CommandSink>,
    bus: Arc<EventBus<ClientEvent>>,
    state: Arc<DeviceStateModel>,
    devices: Vec<BoundDevice>,
    device: BoundDevice,
    iot_id: IotId,
    connection: Mutex<Option<Connection>>,
}

impl Controller {
    // ========================================
    // Login
    // ========================================

    /// Runs the whole authentication chain and selects a device.
    ///
    /// # Errors
    /// Returns the first failing stage's error, `DeviceUnreachable` if
    /// no (matching) device is bound, or a config error.
    pub async fn login(config: ClientConfig, username: &str, password: &str) -> Result<Self> {
        config.validate()?;

        let account = AccountClient::new(config.account.clone(), config.cloud.request_timeout())?;
        let login = account.login(username, password).await?;
        let country = login.country_code().to_string();
        let auth_code = login.authorization_code.clone();

        let cloud = CloudClient::new(config.cloud.clone())?;
        let authority = Arc::new(SessionAuthority::new(
            cloud,
            config.identity.resolve(),
            config.session.refresh_margin(),
        ));

        authority.region(&country, &auth_code).await?;
        authority.connect().await?;
        authority.oauth_login(&country, &auth_code).await?;
        authority.provision_device().await?;
        authority.create_session().await?;
        let devices = authority.list_devices().await?;

        let sink: Arc<dyn CommandSink> = Arc::clone(&authority) as Arc<dyn CommandSink>;
        Self::from_parts(config, authority, sink, devices)
    }

    fn from_parts(
        config: ClientConfig,
        authority: Arc<SessionAuthority>,
        sink: Arc<dyn CommandSink>,
        devices: Vec<BoundDevice>,
    ) -> Result<Self> {
        let device = select_device(&devices, config.identity.device_name.as_deref())?;
        let iot_id = IotId::parse(&device.iot_id).map_err(|_| ClientError::DeviceUnreachable)?;

        info!(
            iot_id = %iot_id,
            device = %device.display_name(),
            bound = devices.len(),
            "Device selected"
        );

        Ok(Self {
            config,
            authority,
            sink,
            bus: Arc::new(EventBus::new()),
            state: Arc::new(DeviceStateModel::new()),
            devices,
            device,
            iot_id,
            connection: Mutex::new(None),
        })
    }

    // ========================================
    // Accessors
    // ========================================

    /// Selected device.
    #[must_use]
    pub fn device(&self) -> &BoundDevice {
        &self.device
    }

    /// Every device bound to the account.
    #[must_use]
    pub fn devices(&self) -> &[BoundDevice] {
        &self.devices
    }

    /// Last-known state of the selected device.
    #[must_use]
    pub fn device_state(&self) -> Option<DeviceState> {
        self.state.get(&self.iot_id)
    }

    /// Event bus, for subscribers beyond the convenience methods.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus<ClientEvent>> {
        &self.bus
    }

    /// Session authority backing this controller.
    #[must_use]
    pub fn authority(&self) -> &Arc<SessionAuthority> {
        &self.authority
    }

    /// Returns `true` while a broker connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    // ========================================
    // Subscriptions
    // ========================================

    /// Calls `f` with every battery percentage received.
    pub fn on_battery_changed<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&IotId, u8) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let ClientEvent::BatteryChanged { iot_id, percent } = event {
                f(iot_id, *percent);
            }
            Ok(())
        })
    }

    /// Calls `f` with every position received.
    pub fn on_position_changed<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&IotId, &Position) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let ClientEvent::PositionChanged { iot_id, position } = event {
                f(iot_id, position);
            }
            Ok(())
        })
    }

    /// Calls `f` whenever the broker link becomes ready.
    pub fn on_ready<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if matches!(event, ClientEvent::Ready) {
                f();
            }
            Ok(())
        })
    }

    /// Calls `f` with the operation and message of background failures.
    pub fn on_error<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let ClientEvent::Error { operation, message } = event {
                f(operation, message);
            }
            Ok(())
        })
    }

    // ========================================
    // Connection
    // ========================================

    /// Refreshes the session and opens the broker connection.
    ///
    /// # Errors
    /// Returns refresh errors, or `TransportFailure` if the link cannot
    /// be set up or a connection is already open.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Err(ClientError::transport("already connected"));
        }

        let session = self.authority.refresh_session().await?;
        let region = self
            .authority
            .region_endpoints()
            .ok_or_else(|| ClientError::internal("region endpoints missing after login"))?;
        let identity = self
            .authority
            .identity()
            .ok_or_else(|| ClientError::internal("device identity missing after login"))?;

        let settings = self
            .config
            .broker_settings(&region.region_id, &self.authority.fingerprint().client_id);
        let (broker, events) = MqttBroker::connect(&settings, &identity, session.iot_token.clone())?;

        self.connect_with(Arc::new(broker), events)
    }

    /// Starts the connection workers over an already created broker link.
    ///
    /// # Errors
    /// Returns `TransportFailure` if a connection is already open.
    pub fn connect_with(
        &self,
        broker: Arc<dyn Broker>,
        events: mpsc::Receiver<BrokerEvent>,
    ) -> Result<()> {
        let mut slot = self.connection.lock();
        if slot.is_some() {
            return Err(ClientError::transport("already connected"));
        }

        let cancel = CancellationToken::new();
        let pending = Arc::new(PendingQueue::new());
        let correlator = CommandCorrelator::new(
            Arc::clone(&self.sink),
            Arc::clone(&pending),
            self.config.commands.queue_capacity,
            self.config.commands.deadline(),
        );
        let router = TelemetryRouter::new(Arc::clone(&self.state), pending, Arc::clone(&self.bus));

        let dispatcher = Dispatcher {
            router,
            bus: Arc::clone(&self.bus),
            correlator: correlator.clone(),
            iot_id: self.iot_id.clone(),
            report: self.config.tasks.report_command(),
            ready_seen: AtomicBool::new(false),
            cancel: cancel.clone(),
        };
        let mut tasks = vec![("dispatch", tokio::spawn(dispatcher.run(events)))];

        let resync = ResyncTask::new(correlator.clone(), Arc::clone(&broker), self.iot_id.clone());
        tasks.push((
            "resync",
            spawn_recurring(
                Arc::new(resync),
                self.config.tasks.resync_interval(),
                cancel.clone(),
                Arc::clone(&self.bus),
            ),
        ));

        if self.config.tasks.refresh_enabled {
            let refresh = RefreshTask::new(
                Arc::clone(&self.authority),
                Arc::clone(&broker),
                correlator.clone(),
                self.iot_id.clone(),
                self.config.tasks.report_command(),
            );
            tasks.push((
                "refresh",
                spawn_recurring(
                    Arc::new(refresh),
                    self.config.tasks.refresh_interval(),
                    cancel.clone(),
                    Arc::clone(&self.bus),
                ),
            ));
        }

        info!(iot_id = %self.iot_id, workers = tasks.len(), "Connection started");
        *slot = Some(Connection {
            broker,
            correlator,
            cancel,
            tasks,
        });
        Ok(())
    }

    /// Stops the workers, fails in-flight commands and closes the link.
    ///
    /// Does nothing when not connected.
    ///
    /// # Errors
    /// Returns the broker's error if closing the link fails.
    pub async fn disconnect(&self) -> Result<()> {
        let Some(connection) = self.connection.lock().take() else {
            return Ok(());
        };

        info!(iot_id = %self.iot_id, "Disconnecting");
        connection.cancel.cancel();
        connection.correlator.shutdown("disconnected");
        let closed = connection.broker.disconnect().await;

        for (name, task) in connection.tasks {
            match tokio::time::timeout(TASK_STOP_TIMEOUT, task).await {
                Ok(Ok(())) => debug!(task = name, "Worker stopped"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Worker failed"),
                Err(_) => warn!(task = name, "Worker did not stop in time"),
            }
        }

        self.bus.publish(&ClientEvent::Disconnected {
            reason: "disconnect requested".into(),
        });
        closed.map_err(ClientError::from)
    }

    // ========================================
    // Commands
    // ========================================

    fn correlator(&self) -> Result<CommandCorrelator> {
        self.connection
            .lock()
            .as_ref()
            .map(|c| c.correlator.clone())
            .ok_or_else(|| ClientError::transport("not connected"))
    }

    /// Sends a motion command and returns the device's reply.
    ///
    /// # Errors
    /// See [`queue_command`](Self::queue_command).
    pub async fn send_motion(&self, linear: i32, angular: i32) -> Result<Vec<u8>> {
        self.queue_command(DeviceCommand::motion(linear, angular)).await
    }

    /// Sends a zero-speed motion command.
    ///
    /// # Errors
    /// See [`queue_command`](Self::queue_command).
    pub async fn stop(&self) -> Result<Vec<u8>> {
        self.queue_command(DeviceCommand::stop()).await
    }

    /// Sends `command` to the selected device and waits for the reply.
    ///
    /// # Errors
    /// Returns `TransportFailure` when not connected or on disconnect,
    /// `CommandTimeout` if no reply arrives in time, or the delivery error.
    pub async fn queue_command(&self, command: DeviceCommand) -> Result<Vec<u8>> {
        let correlator = self.correlator()?;
        debug!(iot_id = %self.iot_id, command = %command, "Queueing command");
        correlator.send(&self.iot_id, &command).await
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.cancel.cancel();
            connection.correlator.shutdown("controller dropped");
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("iot_id", &self.iot_id)
            .field("device", &self.device.device_name)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Picks the device named `name`, or the first one.
fn select_device(devices: &[BoundDevice], name: Option<&str>) -> Result<BoundDevice> {
    let chosen = match name {
        Some(name) => devices.iter().find(|d| d.device_name == name),
        None => devices.first(),
    };
    chosen.cloned().ok_or(ClientError::DeviceUnreachable)
}

// ============================================
// Dispatch Worker
// ============================================

struct Dispatcher {
    router: TelemetryRouter,
    bus: Arc<EventBus<ClientEvent>>,
    correlator: CommandCorrelator,
    iot_id: IotId,
    report: DeviceCommand,
    ready_seen: AtomicBool,
    cancel: CancellationToken,
}

impl Dispatcher {
    async fn run(self, mut events: mpsc::Receiver<BrokerEvent>) {
        debug!("Dispatch worker started");
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event);
        }
        debug!("Dispatch worker stopped");
    }

    fn handle(&self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => {
                self.bus.publish(&ClientEvent::Connected);
            }
            BrokerEvent::Ready => {
                self.bus.publish(&ClientEvent::Ready);
                if !self.ready_seen.swap(true, Ordering::SeqCst) {
                    self.spawn_initial_sync();
                }
            }
            BrokerEvent::Disconnected { reason } => {
                self.bus.publish(&ClientEvent::Disconnected { reason });
            }
            BrokerEvent::Message { topic, payload } => {
                self.router.on_message(&topic, &payload);
            }
        }
    }

    fn spawn_initial_sync(&self) {
        let correlator = self.correlator.clone();
        let bus = Arc::clone(&self.bus);
        let iot_id = self.iot_id.clone();
        let cancel = self.cancel.clone();
        let commands = [DeviceCommand::ble_sync(), self.report];

        tokio::spawn(async move {
            for command in commands {
                let outcome = tokio::select! {
                    () = cancel.cancelled() => return,
                    outcome = correlator.send(&iot_id, &command) => outcome,
                };
                if let Err(e) = outcome {
                    warn!(iot_id = %iot_id, command = %command, error = %e, "Initial sync command failed");
                    bus.publish(&ClientEvent::error("initial sync", &e));
                }
            }
        });
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientFingerprint, CloudConfig};
    use async_trait::async_trait;
    use mockito::{Matcher, Server};
    use mowlink_core::protocol::luba::{luba_msg, LubaMsg};
    use mowlink_transport::MockBroker;
    use prost::Message;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn deliver(&self, _: &IotId, payload: &[u8]) -> Result<()> {
            self.delivered.lock().push(payload.to_vec());
            Ok(())
        }
    }

    fn bound(iot_id: &str, name: &str) -> BoundDevice {
        BoundDevice {
            iot_id: iot_id.into(),
            device_name: name.into(),
            product_key: "pk".into(),
            product_name: "Luba".into(),
            nick_name: None,
            status: 1,
        }
    }

    fn offline_controller(sink: Arc<RecordingSink>) -> Controller {
        let mut config = ClientConfig::default();
        config.tasks.refresh_enabled = false;
        let authority = Arc::new(SessionAuthority::new(
            CloudClient::new(CloudConfig::default()).unwrap(),
            ClientFingerprint {
                client_id: "C1".into(),
                device_sn: "D1".into(),
                utdid: "U1".into(),
            },
            Duration::from_secs(300),
        ));
        Controller::from_parts(config, authority, sink, vec![bound("dev-1", "Luba-A")]).unwrap()
    }

    async fn until<F: Fn() -> bool>(condition: F) {
        for _ in 0..2000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_select_device() {
        let devices = vec![bound("a", "Luba-A"), bound("b", "Luba-B")];
        assert_eq!(select_device(&devices, None).unwrap().iot_id, "a");
        assert_eq!(select_device(&devices, Some("Luba-B")).unwrap().iot_id, "b");
        assert!(matches!(
            select_device(&devices, Some("Yuka")),
            Err(ClientError::DeviceUnreachable)
        ));
        assert!(matches!(select_device(&[], None), Err(ClientError::DeviceUnreachable)));
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let controller = offline_controller(Arc::new(RecordingSink::default()));
        let err = controller.send_motion(100, 0).await.unwrap_err();
        assert!(matches!(err, ClientError::TransportFailure { .. }));
        assert!(controller.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_messages_reach_subscribers() {
        let controller = offline_controller(Arc::new(RecordingSink::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            controller.on_battery_changed(move |_, percent| seen.lock().push(percent));
        }

        let (tx, rx) = mpsc::channel(8);
        controller.connect_with(Arc::new(MockBroker::new()), rx).unwrap();
        assert!(controller.is_connected());

        let payload = json!({
            "method": "thing.properties",
            "params": { "iotId": "dev-1", "items": { "batteryPercentage": { "time": 1, "value": 76 } } }
        })
        .to_string()
        .into_bytes();
        tx.send(BrokerEvent::Message {
            topic: "/sys/pk/dn/app/down/thing/properties".into(),
            payload,
        })
        .await
        .unwrap();

        until(|| !seen.lock().is_empty()).await;
        assert_eq!(*seen.lock(), vec![76]);
        assert_eq!(controller.device_state().unwrap().battery, Some(76));
        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_first_ready_sends_ble_sync() {
        let sink = Arc::new(RecordingSink::default());
        let controller = offline_controller(Arc::clone(&sink));
        let ready = Arc::new(AtomicBool::new(false));
        {
            let ready = Arc::clone(&ready);
            controller.on_ready(move || ready.store(true, Ordering::SeqCst));
        }

        let (tx, rx) = mpsc::channel(8);
        controller.connect_with(Arc::new(MockBroker::new()), rx).unwrap();
        tx.send(BrokerEvent::Ready).await.unwrap();

        until(|| !sink.delivered.lock().is_empty()).await;
        assert!(ready.load(Ordering::SeqCst));
        let first = sink.delivered.lock()[0].clone();
        let msg = LubaMsg::decode(first.as_slice()).unwrap();
        assert!(matches!(msg.sub_msg, Some(luba_msg::SubMsg::Net(_))));
        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_fails_in_flight_command() {
        let sink = Arc::new(RecordingSink::default());
        let controller = Arc::new(offline_controller(Arc::clone(&sink)));
        let broker = Arc::new(MockBroker::new());
        let (_tx, rx) = mpsc::channel(8);
        controller.connect_with(Arc::clone(&broker) as Arc<dyn Broker>, rx).unwrap();

        let command = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.send_motion(500, 0).await })
        };
        until(|| !sink.delivered.lock().is_empty()).await;

        let started = tokio::time::Instant::now();
        controller.disconnect().await.unwrap();
        let err = command.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::TransportFailure { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(broker.is_closed());
        assert!(!controller.is_connected());
    }

    #[tokio::test]
    async fn test_login_runs_full_chain() {
        let mut server = Server::new_async().await;
        let host = server.host_with_port();
        let ok = |data: serde_json::Value| json!({"code": 200, "data": data}).to_string();

        server
            .mock("POST", Matcher::Regex("^/oauth/token".into()))
            .with_status(200)
            .with_body(
                json!({"code": 0, "data": {
                    "access_token": "at", "authorization_code": "code1",
                    "userInformation": {"domainAbbreviation": "US"}
                }})
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("POST", "/living/account/region/get")
            .match_body(Matcher::PartialJson(json!({"params": {"authCode": "code1", "countryCode": "US"}})))
            .with_status(200)
            .with_body(ok(json!({
                "apiGatewayEndpoint": host, "oaApiGatewayEndpoint": host, "regionId": "us-east-1"
            })))
            .create_async()
            .await;
        server
            .mock("POST", Matcher::Regex(r"^/api/prd/connect\.json".into()))
            .with_status(200)
            .with_body(json!({"data": {"vid": "v", "data": {"device": {"data": {"deviceId": "d"}}}}}).to_string())
            .create_async()
            .await;
        server
            .mock("POST", Matcher::Regex(r"^/api/prd/loginbyoauth\.json".into()))
            .with_status(200)
            .with_body(json!({"data": {"data": {"loginSuccessResult": {"sid": "sid"}}}}).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/app/aepauth/handle")
            .with_status(200)
            .with_body(ok(json!({"productKey": "pk", "deviceName": "dn", "deviceSecret": "s"})))
            .create_async()
            .await;
        server
            .mock("POST", "/account/createSessionByAuthCode")
            .with_status(200)
            .with_body(ok(json!({
                "identityId": "i", "refreshToken": "r", "refreshTokenExpire": 7200,
                "iotToken": "t", "iotTokenExpire": 7200
            })))
            .create_async()
            .await;
        server
            .mock("POST", "/uc/listBindingByAccount")
            .with_status(200)
            .with_body(ok(json!({"total": 2, "data": [
                {"iotId": "iot-a", "deviceName": "Luba-A"},
                {"iotId": "iot-b", "deviceName": "Luba-B"}
            ]})))
            .create_async()
            .await;

        let mut config = ClientConfig::default();
        config.account.auth_url = server.url();
        config.cloud.scheme = "http".into();
        config.cloud.gateway_domain = host.clone();
        config.cloud.handshake_host = host;
        config.identity.device_name = Some("Luba-B".into());

        let controller = Controller::login(config, "user", "pass").await.unwrap();
        assert_eq!(controller.devices().len(), 2);
        assert_eq!(controller.device().iot_id, "iot-b");
        assert!(!controller.is_connected());
    }
}
