// ============================================
// File: crates/mowlink-client/src/services/telemetry.rs
// ============================================
//! # Telemetry Router
//!
//! ## Creation Reason
//! Every inbound broker payload passes through here: it is classified,
//! folded into the device state, published on the event bus and, when
//! it can be a reply, used to resolve the device's pending command.
//!
//! ## Routing Table
//! ```text
//! thing.properties ─► battery ─► state + BatteryChanged ─► resolve(raw JSON)
//! thing.events
//!   device_protobuf ─► report ─► state + Battery/PositionChanged ─► resolve(protobuf)
//!   anything else   ─► Telemetry event (opaque)
//! thing.status     ─► connectivity flag
//! other methods    ─► ignored
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A message that fails to decode is logged and dropped; it never
//!   resolves a command and never stops the dispatch loop
//! - State is updated and its lock released BEFORE resolving, so the
//!   two locks are never held together
//!
//! ## Last Modified
//! v0.1.0 - Initial router

use std::sync::Arc;

use tracing::{debug, info_span, trace, warn, Span};

use mowlink_common::time::Timestamp;
use mowlink_common::types::IotId;
use mowlink_core::protocol::DeviceReport;
use mowlink_core::telemetry::{ThingEvent, ThingMessage};

use crate::bus::{ClientEvent, EventBus};
use crate::error::{ClientError, Result};
use crate::services::correlator::PendingQueue;
use crate::services::device_state::{DeviceStateModel, Position};

/// What a routed message amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Property snapshot applied
    Properties,
    /// Device report applied
    DeviceReport,
    /// Opaque event forwarded
    Forwarded,
    /// Connectivity updated
    Status,
    /// Unknown method, ignored
    Ignored,
}

/// Classifies inbound payloads and applies them.
#[derive(Debug)]
pub struct TelemetryRouter {
    state: Arc<DeviceStateModel>,
    pending: Arc<PendingQueue>,
    bus: Arc<EventBus<ClientEvent>>,
}

impl TelemetryRouter {
    /// Creates a router over shared state, pending queue and bus.
    #[must_use]
    pub fn new(
        state: Arc<DeviceStateModel>,
        pending: Arc<PendingQueue>,
        bus: Arc<EventBus<ClientEvent>>,
    ) -> Self {
        Self { state, pending, bus }
    }

    /// Device state this router writes.
    #[must_use]
    pub fn state(&self) -> &Arc<DeviceStateModel> {
        &self.state
    }

    /// Handles one broker payload. Never fails; bad payloads are logged.
    pub fn on_message(&self, topic: &str, payload: &[u8]) {
        let span = info_span!(parent: Span::none(), "telemetry", topic = %topic, bytes = payload.len());
        let _enter = span.enter();

        match self.route(payload) {
            Ok(routed) => trace!(?routed, "Message routed"),
            Err(e) => warn!(error = %e, "Dropping inbound message"),
        }
    }

    /// Classifies and applies one payload.
    ///
    /// # Errors
    /// Returns `ProtocolDecode` for malformed JSON, protobuf or base64,
    /// or an invalid device id.
    pub fn route(&self, payload: &[u8]) -> Result<Routed> {
        let message =
            ThingMessage::parse(payload).map_err(|e| ClientError::decode("telemetry message", e))?;

        match message {
            ThingMessage::Properties(snapshot) => {
                let iot_id = parse_id(&snapshot.iot_id)?;
                match snapshot.battery {
                    Some(item) => {
                        self.state
                            .set_battery(&iot_id, item.value, message_time(item.time));
                        self.publish(ClientEvent::BatteryChanged {
                            iot_id: iot_id.clone(),
                            percent: item.value,
                        });
                    }
                    None => self.state.touch(&iot_id, Timestamp::now()),
                }
                self.resolve(&iot_id, payload.to_vec());
                Ok(Routed::Properties)
            }
            ThingMessage::Event { iot_id, event } => {
                let iot_id = parse_id(&iot_id)?;
                match event {
                    ThingEvent::DeviceProtobuf { content } => {
                        self.apply_report(&iot_id, &content)?;
                        self.resolve(&iot_id, content);
                        Ok(Routed::DeviceReport)
                    }
                    other => {
                        debug!(iot_id = %iot_id, kind = other.kind(), "Forwarding device event");
                        self.state.touch(&iot_id, Timestamp::now());
                        self.publish(ClientEvent::Telemetry {
                            iot_id,
                            event: other,
                        });
                        Ok(Routed::Forwarded)
                    }
                }
            }
            ThingMessage::Status { iot_id, online } => {
                let iot_id = parse_id(&iot_id)?;
                debug!(iot_id = %iot_id, online, "Device status");
                self.state.set_online(&iot_id, online, Timestamp::now());
                Ok(Routed::Status)
            }
            ThingMessage::Unknown { method } => {
                debug!(method = %method, "Ignoring message with unknown method");
                Ok(Routed::Ignored)
            }
        }
    }

    fn apply_report(&self, iot_id: &IotId, content: &[u8]) -> Result<()> {
        let report =
            DeviceReport::decode(content).map_err(|e| ClientError::decode("device report", e))?;
        let now = Timestamp::now();

        if report.is_empty() {
            self.state.touch(iot_id, now);
            return Ok(());
        }
        if let Some(percent) = report.battery {
            self.state.set_battery(iot_id, percent, now);
            self.publish(ClientEvent::BatteryChanged {
                iot_id: iot_id.clone(),
                percent,
            });
        }
        if let Some(fix) = report.location {
            let position = Position::from(fix);
            self.state.set_position(iot_id, position, now);
            self.publish(ClientEvent::PositionChanged {
                iot_id: iot_id.clone(),
                position,
            });
        }
        Ok(())
    }

    fn resolve(&self, iot_id: &IotId, reply: Vec<u8>) {
        if self.pending.resolve(iot_id, reply) {
            trace!(iot_id = %iot_id, "Pending command resolved");
        }
    }

    fn publish(&self, event: ClientEvent) {
        let dispatch = self.bus.publish(&event);
        if dispatch.failed > 0 {
            debug!(kind = event.kind(), failed = dispatch.failed, "Some subscribers failed");
        }
    }
}

fn parse_id(raw: &str) -> Result<IotId> {
    IotId::parse(raw).map_err(|e| ClientError::decode("iot id", e))
}

/// Device-side time when plausible, local time otherwise.
fn message_time(millis: i64) -> Timestamp {
    if millis > 0 {
        Timestamp::from_millis(millis)
    } else {
        Timestamp::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use mowlink_core::protocol::luba::{
        luba_msg, mctl_sys, LubaMsg, MctlSys, MsgCmdType, ReportInfoData, RptDevLocation,
    };
    use mowlink_core::protocol::FixQuality;
    use parking_lot::Mutex;
    use prost::Message;
    use serde_json::json;

    struct Fixture {
        router: TelemetryRouter,
        pending: Arc<PendingQueue>,
        events: Arc<Mutex<Vec<ClientEvent>>>,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = Arc::clone(&events);
            bus.subscribe(move |e: &ClientEvent| {
                events.lock().push(e.clone());
                Ok(())
            });
        }
        let pending = Arc::new(PendingQueue::new());
        let router = TelemetryRouter::new(
            Arc::new(DeviceStateModel::new()),
            Arc::clone(&pending),
            bus,
        );
        Fixture {
            router,
            pending,
            events,
        }
    }

    fn id() -> IotId {
        IotId::parse("dev-1").unwrap()
    }

    fn location_report() -> Vec<u8> {
        LubaMsg {
            msgtype: MsgCmdType::EmbedSys as i32,
            sub_msg: Some(luba_msg::SubMsg::Sys(MctlSys {
                sub_sys_msg: Some(mctl_sys::SubSysMsg::ToappReportData(ReportInfoData {
                    dev: None,
                    rtk: None,
                    locations: vec![RptDevLocation {
                        real_pos_x: 120,
                        real_pos_y: 45,
                        real_toward: 90,
                        pos_type: 4,
                    }],
                })),
            })),
            ..Default::default()
        }
        .encode_to_vec()
    }

    fn protobuf_event(content: &[u8]) -> Vec<u8> {
        json!({
            "method": "thing.events",
            "params": {
                "iotId": "dev-1",
                "identifier": "device_protobuf_msg_event",
                "value": { "content": BASE64.encode(content) }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_property_battery_updates_state() {
        let f = fixture();
        let payload = json!({
            "method": "thing.properties",
            "params": {
                "iotId": "dev-1",
                "items": { "batteryPercentage": { "time": 1_700_000_000_000_i64, "value": 76 } }
            }
        })
        .to_string();

        assert_eq!(f.router.route(payload.as_bytes()).unwrap(), Routed::Properties);
        assert_eq!(f.router.state().get(&id()).unwrap().battery, Some(76));

        let events = f.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            ClientEvent::BatteryChanged {
                iot_id: id(),
                percent: 76
            }
        );
    }

    #[test]
    fn test_location_report_updates_position() {
        let f = fixture();
        let routed = f.router.route(&protobuf_event(&location_report())).unwrap();
        assert_eq!(routed, Routed::DeviceReport);

        let position = f.router.state().get(&id()).unwrap().position.unwrap();
        assert_eq!((position.x, position.y, position.heading), (120.0, 45.0, 90.0));
        assert_eq!(position.fix_quality, FixQuality::RtkFixed);
        assert_eq!(position.fix_quality.to_string(), "RTK fixed");

        let events = f.events.lock();
        let moves = events
            .iter()
            .filter(|e| matches!(e, ClientEvent::PositionChanged { .. }))
            .count();
        assert_eq!(moves, 1);
    }

    #[tokio::test]
    async fn test_protobuf_event_resolves_pending() {
        use crate::services::correlator::{CommandCorrelator, CommandSink};
        use async_trait::async_trait;

        struct NullSink;

        #[async_trait]
        impl CommandSink for NullSink {
            async fn deliver(&self, _: &IotId, _: &[u8]) -> Result<()> {
                Ok(())
            }
        }

        let f = fixture();
        let correlator = CommandCorrelator::new(
            Arc::new(NullSink),
            Arc::clone(&f.pending),
            4,
            std::time::Duration::from_secs(5),
        );
        let task = {
            let c = correlator.clone();
            tokio::spawn(async move { c.enqueue(&id(), "report_config", vec![]).await })
        };
        while f.pending.pending(&id()) == 0 {
            tokio::task::yield_now().await;
        }

        let report = location_report();
        f.router.on_message("/sys/pk/dn/app/down/thing/events", &protobuf_event(&report));
        assert_eq!(task.await.unwrap().unwrap(), report);
    }

    #[test]
    fn test_other_events_forwarded() {
        let f = fixture();
        let payload = json!({
            "method": "thing.events",
            "params": { "iotId": "dev-1", "identifier": "device_warning_event", "value": { "code": 1001 } }
        })
        .to_string();

        assert_eq!(f.router.route(payload.as_bytes()).unwrap(), Routed::Forwarded);
        assert_eq!(
            f.events.lock()[0],
            ClientEvent::Telemetry {
                iot_id: id(),
                event: ThingEvent::Warning { code: 1001 }
            }
        );
    }

    #[test]
    fn test_status_sets_connectivity() {
        let f = fixture();
        let payload = json!({
            "method": "thing.status",
            "params": { "iotId": "dev-1", "status": { "value": 3 } }
        })
        .to_string();

        assert_eq!(f.router.route(payload.as_bytes()).unwrap(), Routed::Status);
        assert_eq!(f.router.state().get(&id()).unwrap().online, Some(false));
    }

    #[test]
    fn test_bad_payloads_are_dropped() {
        let f = fixture();

        f.router.on_message("t", b"not json");
        f.router.on_message("t", &protobuf_event(&[0xff, 0xff, 0xff]));
        f.router.on_message("t", br#"{"method":"thing.unheard.of"}"#);

        assert!(f.events.lock().is_empty());
        assert!(f.router.route(b"{").is_err());
        assert_eq!(
            f.router.route(br#"{"method":"x"}"#).unwrap(),
            Routed::Ignored
        );
    }
}
