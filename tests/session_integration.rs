// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the connection state machine.
//!
//! A scripted in-memory transport replays poll outcomes while the tokio
//! clock is paused, so timeouts and retry delays run in virtual time.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use smarthome_lp::protocol::{Endpoint, Request, Response, Transport};
use smarthome_lp::subscription::Subscribable;
use smarthome_lp::topology::{
    ActuatorDescriptor, ActuatorGroup, LocationDescriptor, SensorDescriptor, Topology,
};
use smarthome_lp::{
    ConnectionBuilder, ConnectionEvent, DataError, Error, PollPolicy, PollState, ProtocolError,
    SessionError, TransportError, Value, ValueError,
};
use tokio::sync::broadcast;
use tokio::time::Instant;

const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE: &str = r#"{"changes": []}"#;

// ============================================================================
// Scripted transport
// ============================================================================

enum Step {
    Respond(Response),
    Fail(TransportError),
    Delay(Duration, Response),
    Hang,
}

fn changes(items: serde_json::Value) -> Step {
    Step::Respond(Response::ok(json!({ "changes": items }).to_string()))
}

#[derive(Default)]
struct Script {
    polls: VecDeque<Step>,
    values: HashMap<String, String>,
    value_delays: HashMap<String, Duration>,
    fail_sets: bool,
    log: Vec<(Instant, Request)>,
}

#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    fn new(polls: impl IntoIterator<Item = Step>) -> Self {
        let transport = Self::default();
        transport.script.lock().polls.extend(polls);
        transport
            .with_value("s2", "geschlossen")
            .with_value("a1", "0")
    }

    fn with_value(self, id: &str, raw: &str) -> Self {
        self.script.lock().values.insert(id.into(), raw.into());
        self
    }

    fn with_delayed_value(self, id: &str, raw: &str, delay: Duration) -> Self {
        self.script.lock().value_delays.insert(id.into(), delay);
        self.with_value(id, raw)
    }

    fn failing_sets(self) -> Self {
        self.script.lock().fail_sets = true;
        self
    }

    fn requests(&self, endpoint: Endpoint) -> Vec<(Instant, Request)> {
        self.script
            .lock()
            .log
            .iter()
            .filter(|(_, r)| r.endpoint == endpoint)
            .cloned()
            .collect()
    }

    fn all_requests(&self) -> Vec<Request> {
        self.script.lock().log.iter().map(|(_, r)| r.clone()).collect()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let step = {
            let mut script = self.script.lock();
            script.log.push((Instant::now(), request.clone()));
            let id = request.param("Id").unwrap_or_default().to_string();
            match request.endpoint {
                Endpoint::LongPoll => script
                    .polls
                    .pop_front()
                    .unwrap_or(Step::Delay(Duration::from_secs(1), Response::ok(IDLE))),
                Endpoint::GetValue => match script.values.get(&id) {
                    Some(raw) => {
                        let response = Response::ok(json!({"Id": id, "Value": raw}).to_string());
                        match script.value_delays.get(&id) {
                            Some(delay) => Step::Delay(*delay, response),
                            None => Step::Respond(response),
                        }
                    }
                    None => Step::Respond(Response::new(404, "")),
                },
                Endpoint::SetValue if script.fail_sets => {
                    Step::Fail(TransportError::ConnectionRefused("gateway down".into()))
                }
                Endpoint::SetValue => {
                    let value = request.param("Value").unwrap_or_default().to_string();
                    script.values.insert(id, value);
                    Step::Respond(Response::ok(""))
                }
                Endpoint::Logout => Step::Respond(Response::ok("")),
            }
        };

        match step {
            Step::Respond(response) => Ok(response),
            Step::Fail(error) => Err(error),
            Step::Delay(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Step::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Two resolved and two unresolved devices.
fn topology() -> Topology {
    Topology::new("sess1", POLL_TIMEOUT)
        .with_location(LocationDescriptor::new("l1", "bad"))
        .with_sensor(SensorDescriptor {
            id: "s1".into(),
            name: "Temperatur".into(),
            device_type: "Rst".into(),
            value: Some(json!("20,5°")),
            base_device_ids: vec!["bd1".into()],
            location_id: Some("l1".into()),
        })
        .with_sensor(SensorDescriptor {
            id: "s2".into(),
            name: "Fenster".into(),
            device_type: "Wds".into(),
            value: None,
            base_device_ids: vec!["bd2".into()],
            location_id: Some("l1".into()),
        })
        .with_actuator_group(ActuatorGroup {
            location_id: "l1".into(),
            base_device_ids: vec!["bd3".into()],
            actuators: vec![
                ActuatorDescriptor {
                    id: "a1".into(),
                    name: "Licht".into(),
                    app_id: None,
                    css_class_name: Some("light".into()),
                    current_value: Some(json!("undefined")),
                    min_value: None,
                    max_value: None,
                    step: None,
                },
                ActuatorDescriptor {
                    id: "h1".into(),
                    name: "Heizung".into(),
                    app_id: None,
                    css_class_name: Some("heating".into()),
                    current_value: Some(json!("21")),
                    min_value: Some(6.0),
                    max_value: Some(30.0),
                    step: Some(0.5),
                },
            ],
        })
}

fn resolved_topology() -> Topology {
    let mut topology = topology();
    topology.sensors.retain(|s| s.id != "s2");
    topology.actuator_groups[0].actuators.retain(|a| a.id != "a1");
    topology
}

async fn next_matching<F>(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    predicate: F,
) -> ConnectionEvent
where
    F: Fn(&ConnectionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            let event = events.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not received in time")
}

fn drain(events: &mut broadcast::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn is_disconnected(event: &ConnectionEvent) -> bool {
    matches!(event, ConnectionEvent::Disconnected)
}

// ============================================================================
// Initialization
// ============================================================================

mod initialization {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ready_fires_once_after_startup_fetches() {
        let transport = ScriptedTransport::new([changes(json!([
            {"Id": "a1", "IsResolveRequired": true}
        ]))]);
        let builder = ConnectionBuilder::new(transport.clone(), topology());
        let ready_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ready_count);
        builder.on_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let connection = builder.connect().await.unwrap();
        connection.wait_ready().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(ready_count.load(Ordering::SeqCst), 1);
        assert!(connection.is_initialized());
        assert_eq!(connection.device("s2").unwrap().is_closed(), Some(true));

        // One startup fetch per unresolved device plus the live resolution.
        let fetched: Vec<String> = transport
            .requests(Endpoint::GetValue)
            .into_iter()
            .filter_map(|(_, r)| r.param("Id").map(str::to_string))
            .collect();
        assert_eq!(fetched.iter().filter(|id| *id == "a1").count(), 2);
        assert_eq!(fetched.iter().filter(|id| *id == "s2").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn live_resolution_does_not_count_toward_ready() {
        let startup_delay = Duration::from_secs(20);
        let transport = ScriptedTransport::new([changes(json!([
            {"Id": "h1", "IsResolveRequired": true}
        ]))])
        .with_delayed_value("s2", "geöffnet", startup_delay)
        .with_value("h1", "22");
        let builder = ConnectionBuilder::new(transport.clone(), topology());
        let ready_at = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ready_at);
        builder.on_ready(move || sink.lock().push(Instant::now()));
        let mut events = builder.subscribe();

        let started = Instant::now();
        let connection = builder.connect().await.unwrap();

        // The live refetch of h1 lands while s2 is still outstanding.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            connection.device("h1").unwrap().value(),
            &Value::Number(22.0)
        );
        assert!(ready_at.lock().is_empty());
        assert!(!connection.is_initialized());
        assert!(connection.device("s2").unwrap().is_unresolved());

        tokio::time::sleep(Duration::from_secs(55)).await;
        let ready_at = ready_at.lock().clone();
        assert_eq!(ready_at.len(), 1);
        assert!(ready_at[0] - started >= startup_delay);
        assert!(connection.is_initialized());
        assert_eq!(connection.device("s2").unwrap().is_open(), Some(true));

        let received = drain(&mut events);
        let ready_events = received
            .iter()
            .filter(|e| matches!(e, ConnectionEvent::Ready))
            .count();
        assert_eq!(ready_events, 1);
        let position = |id: &str| received.iter().position(|e| e.device_id() == Some(id));
        let ready = received
            .iter()
            .position(|e| matches!(e, ConnectionEvent::Ready))
            .unwrap();
        assert!(position("h1").unwrap() < ready);
        assert!(position("s2").unwrap() < ready);

        let live_fetches = transport
            .requests(Endpoint::GetValue)
            .iter()
            .filter(|(_, r)| r.param("Id") == Some("h1"))
            .count();
        assert_eq!(live_fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_is_immediate_without_unresolved_devices() {
        let builder = ConnectionBuilder::new(ScriptedTransport::new([]), resolved_topology());
        let ready_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ready_count);
        builder.on_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let connection = builder.connect().await.unwrap();

        assert_eq!(ready_count.load(Ordering::SeqCst), 1);
        assert!(connection.is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_startup_fetch_still_counts() {
        let mut topology = topology();
        topology.sensors[1].id = "s9".into();
        let builder = ConnectionBuilder::new(ScriptedTransport::new([]), topology);
        let mut events = builder.subscribe();

        let connection = builder.connect().await.unwrap();
        connection.wait_ready().await.unwrap();

        let received = drain(&mut events);
        assert!(received.iter().any(|e| matches!(
            e,
            ConnectionEvent::Error { error, fatal: false } if matches!(
                error.as_ref(),
                Error::Protocol(ProtocolError::UnexpectedStatus { status: 404, .. })
            )
        )));
        assert!(connection.device("s9").unwrap().is_unresolved());
        assert!(connection.is_connected());
    }
}

// ============================================================================
// Long polling state machine
// ============================================================================

mod polling {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn five_timeouts_disconnect() {
        let transport = ScriptedTransport::new((0..5).map(|_| Step::Hang));
        let builder = ConnectionBuilder::new(transport.clone(), topology());
        let mut events = builder.subscribe();
        let connection = builder.connect().await.unwrap();

        let event = next_matching(&mut events, ConnectionEvent::is_fatal_error).await;
        let ConnectionEvent::Error { error, .. } = event else {
            panic!("expected error event");
        };
        assert!(matches!(
            error.as_ref(),
            Error::Session(SessionError::TooManyTimeouts(5))
        ));
        next_matching(&mut events, is_disconnected).await;

        tokio::time::sleep(Duration::from_secs(600)).await;

        let polls = transport.requests(Endpoint::LongPoll);
        assert_eq!(polls.len(), 5);
        let timeouts: Vec<u64> = polls
            .iter()
            .map(|(_, r)| r.timeout.unwrap().as_secs())
            .collect();
        assert_eq!(timeouts, vec![35, 40, 45, 50, 55]);
        assert_eq!(connection.poll_state(), PollState::Disconnected);
        assert!(connection.registry().is_sealed());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_timeout_counter() {
        let mut steps: Vec<Step> = (0..4).map(|_| Step::Hang).collect();
        steps.push(changes(json!([])));
        steps.extend((0..4).map(|_| Step::Hang));
        let transport = ScriptedTransport::new(steps);

        let connection = ConnectionBuilder::new(transport.clone(), topology())
            .connect()
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1000)).await;

        assert!(connection.is_connected());
        let timeouts: Vec<u64> = transport
            .requests(Endpoint::LongPoll)
            .iter()
            .take(10)
            .map(|(_, r)| r.timeout.unwrap().as_secs())
            .collect();
        assert_eq!(timeouts, vec![35, 40, 45, 50, 55, 35, 40, 45, 50, 55]);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connections_back_off_then_disconnect() {
        let refused = || Step::Fail(TransportError::ConnectionRefused("refused".into()));
        let transport = ScriptedTransport::new([refused(), refused(), refused()]);
        let builder = ConnectionBuilder::new(transport.clone(), topology());
        let mut events = builder.subscribe();
        let _connection = builder.connect().await.unwrap();

        let event = next_matching(&mut events, ConnectionEvent::is_fatal_error).await;
        let ConnectionEvent::Error { error, .. } = event else {
            panic!("expected error event");
        };
        assert!(matches!(
            error.as_ref(),
            Error::Session(SessionError::TooManyConnectionErrors(3))
        ));

        let polls = transport.requests(Endpoint::LongPoll);
        assert_eq!(polls.len(), 3);
        assert!(polls[1].0 - polls[0].0 >= POLL_TIMEOUT);
        assert!(polls[2].0 - polls[1].0 >= POLL_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn other_transport_error_is_reported_and_retried() {
        let transport = ScriptedTransport::new([
            Step::Fail(TransportError::Other("connection reset".into())),
            changes(json!([{"Id": "s1", "Value": "22,0°"}])),
        ]);
        let builder = ConnectionBuilder::new(transport.clone(), topology())
            .with_policy(PollPolicy::new().with_retry_delay(Duration::from_secs(2)));
        let mut events = builder.subscribe();
        let connection = builder.connect().await.unwrap();

        let event =
            next_matching(&mut events, |e| matches!(e, ConnectionEvent::Error { .. })).await;
        assert!(!event.is_fatal_error());

        let event = next_matching(&mut events, |e| e.device_id() == Some("s1")).await;
        let ConnectionEvent::Changed(change) = event else {
            panic!("expected change event");
        };
        assert_eq!(change.old_value, Value::Number(20.5));
        assert_eq!(change.device.value(), &Value::Number(22.0));

        let polls = transport.requests(Endpoint::LongPoll);
        assert!(polls[1].0 - polls[0].0 >= Duration::from_secs(2));
        assert!(connection.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_is_fatal() {
        let transport = ScriptedTransport::new([Step::Respond(Response::ok("<html>"))]);
        let builder = ConnectionBuilder::new(transport.clone(), topology());
        let mut events = builder.subscribe();
        let _connection = builder.connect().await.unwrap();

        let event = next_matching(&mut events, ConnectionEvent::is_fatal_error).await;
        let ConnectionEvent::Error { error, .. } = event else {
            panic!("expected error event");
        };
        assert!(matches!(
            error.as_ref(),
            Error::Protocol(ProtocolError::Json(_))
        ));
        next_matching(&mut events, is_disconnected).await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.requests(Endpoint::LongPoll).len(), 1);
        // Fatal endings do not log out.
        assert!(transport.requests(Endpoint::Logout).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timestamps_strictly_increase() {
        let transport = ScriptedTransport::new([]);
        let connection = ConnectionBuilder::new(transport.clone(), topology())
            .connect()
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        connection.disconnect();

        let stamps: Vec<i64> = transport
            .all_requests()
            .iter()
            .map(|r| r.param("_").unwrap().parse().unwrap())
            .collect();
        assert!(stamps.len() > 3);
        assert!(stamps.windows(2).all(|w| w[1] > w[0]));
    }
}

// ============================================================================
// Update processing
// ============================================================================

mod updates {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn repeated_value_changes_once() {
        let transport = ScriptedTransport::new([
            changes(json!([{"Id": "s1", "Value": "23,5°"}])),
            changes(json!([{"Id": "s1", "Value": "23.5"}])),
            changes(json!([{"Id": "s1", "Value": "23,5°"}])),
        ]);
        let builder = ConnectionBuilder::new(transport, topology());
        let device_changes = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&device_changes);
        builder.on_device_change("s1", move |change| {
            assert_eq!(change.device.id(), "s1");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let connection = builder.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(device_changes.load(Ordering::SeqCst), 1);
        assert_eq!(
            connection.registry().location_temperature("bad"),
            Some(23.5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_id_is_recoverable() {
        let transport = ScriptedTransport::new([changes(json!([
            {"Id": "ghost", "Value": "1"},
            {"Id": "s1", "Value": "19°"}
        ]))]);
        let builder = ConnectionBuilder::new(transport, topology());
        let mut events = builder.subscribe();
        let connection = builder.connect().await.unwrap();

        let event =
            next_matching(&mut events, |e| matches!(e, ConnectionEvent::Error { .. })).await;
        let ConnectionEvent::Error { error, fatal } = event else {
            panic!("expected error event");
        };
        assert!(!fatal);
        assert!(matches!(
            error.as_ref(),
            Error::Data(DataError::UnknownDevice(id)) if id == "ghost"
        ));

        // Items after the unknown one are still applied.
        next_matching(&mut events, |e| e.device_id() == Some("s1")).await;
        assert!(connection.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn messages_are_forwarded() {
        let transport = ScriptedTransport::new([changes(json!([
            {"Message": "Batterie schwach", "Metadata": {"Device": "s2"}}
        ]))]);
        let builder = ConnectionBuilder::new(transport, topology());
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        builder.on_message(move |payload| sink.lock().push(payload.clone()));

        let _connection = builder.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let messages = messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["Message"], "Batterie schwach");
    }

    #[tokio::test(start_paused = true)]
    async fn session_error_in_body_is_fatal() {
        let transport = ScriptedTransport::new([Step::Respond(Response::ok(
            r#"{"error": "NotAuthenticated"}"#,
        ))]);
        let builder = ConnectionBuilder::new(transport, topology());
        let disconnected = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&disconnected);
        builder.on_disconnected(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut events = builder.subscribe();
        let connection = builder.connect().await.unwrap();

        let event = next_matching(&mut events, ConnectionEvent::is_fatal_error).await;
        assert!(matches!(
            event,
            ConnectionEvent::Error { ref error, .. }
                if matches!(error.as_ref(), Error::Session(SessionError::Terminated(_)))
        ));
        next_matching(&mut events, is_disconnected).await;
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);
        assert!(!connection.is_connected());
    }
}

// ============================================================================
// Write path and teardown
// ============================================================================

mod control {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn set_value_writes_then_refetches() {
        let transport = ScriptedTransport::new([]);
        let connection = ConnectionBuilder::new(transport.clone(), topology())
            .connect()
            .await
            .unwrap();
        connection.wait_ready().await.unwrap();

        let device = connection.set_value("Heizung", 22.5).await.unwrap();
        assert_eq!(device.value(), &Value::Number(22.5));
        assert_eq!(device.display_value(), "22.5°C");

        let sets = transport.requests(Endpoint::SetValue);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].1.param("Id"), Some("h1"));
        assert_eq!(sets[0].1.param("Value"), Some("22.5"));

        let last_get = transport.requests(Endpoint::GetValue).pop().unwrap();
        assert!(last_get.0 >= sets[0].0);
        assert_eq!(last_get.1.param("Id"), Some("h1"));
    }

    #[tokio::test(start_paused = true)]
    async fn local_checks_reject_before_sending() {
        let transport = ScriptedTransport::new([]);
        let connection = ConnectionBuilder::new(transport.clone(), topology())
            .connect()
            .await
            .unwrap();
        connection.wait_ready().await.unwrap();

        assert!(matches!(
            connection.set_value("h1", 40.0).await,
            Err(Error::Value(ValueError::OutOfRange { .. }))
        ));
        assert!(matches!(
            connection.set_value("h1", f64::NAN).await,
            Err(Error::Value(ValueError::NotFinite(_)))
        ));
        assert!(matches!(
            connection.set_value("s1", 1.0).await,
            Err(Error::Value(ValueError::NotAnActuator(_)))
        ));
        assert!(matches!(
            connection.toggle("h1").await,
            Err(Error::Value(ValueError::NotToggleable(_)))
        ));
        assert!(matches!(
            connection.set_value("nothing", 1.0).await,
            Err(Error::DeviceNotFound(_))
        ));
        assert!(transport.requests(Endpoint::SetValue).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_inverts_light() {
        let transport = ScriptedTransport::new([]);
        let connection = ConnectionBuilder::new(transport, topology())
            .connect()
            .await
            .unwrap();
        connection.wait_ready().await.unwrap();

        assert_eq!(connection.actuator("licht").unwrap().display_value(), "off");
        let device = connection.toggle("licht").await.unwrap();
        assert_eq!(device.display_value(), "on");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_set_is_returned_and_broadcast() {
        let transport = ScriptedTransport::new([]).failing_sets();
        let builder = ConnectionBuilder::new(transport, topology());
        let mut events = builder.subscribe();
        let connection = builder.connect().await.unwrap();
        connection.wait_ready().await.unwrap();
        drain(&mut events);

        let err = connection.set_value("h1", 20.0).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::ConnectionRefused(_))
        ));

        let received = drain(&mut events);
        assert_eq!(received.len(), 1);
        assert!(matches!(
            &received[0],
            ConnectionEvent::Error { error, fatal: false }
                if matches!(error.as_ref(), Error::Transport(TransportError::ConnectionRefused(_)))
        ));
        assert!(connection.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_discards_inflight_poll() {
        let transport = ScriptedTransport::new([Step::Delay(
            Duration::from_secs(10),
            Response::ok(json!({"changes": [{"Id": "s1", "Value": "30°"}]}).to_string()),
        )]);
        let builder = ConnectionBuilder::new(transport.clone(), topology());
        let mut events = builder.subscribe();
        let connection = builder.connect().await.unwrap();
        connection.wait_ready().await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        connection.disconnect();
        connection.disconnect();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let received = drain(&mut events);
        let disconnects = received.iter().filter(|e| is_disconnected(e)).count();
        assert_eq!(disconnects, 1);
        assert!(is_disconnected(received.last().unwrap()));
        assert!(!received.iter().any(|e| e.device_id() == Some("s1")));
        assert_eq!(
            connection.device("s1").unwrap().value(),
            &Value::Number(20.5)
        );
        assert_eq!(transport.requests(Endpoint::LongPoll).len(), 1);
        assert_eq!(transport.requests(Endpoint::Logout).len(), 1);

        assert!(matches!(
            connection.set_value("h1", 20.0).await,
            Err(Error::NotConnected)
        ));
        assert!(connection.wait_ready().await.is_ok());
    }
}
