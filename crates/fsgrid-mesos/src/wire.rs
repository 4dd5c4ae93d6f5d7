//! JSON messages of the Mesos v1 scheduler API.
//!
//! - [`Event`] is one record of the subscription stream, decoded into a
//!   [`ClusterEvent`] by [`Event::into_cluster_event`]
//! - [`Call`] is one request to the master, encoded by [`Call::to_json`]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fsgrid_core::offer::ANY_ROLE;
use fsgrid_core::{Attribute, MasterInfo, Offer, Range, Resource, ResourceValue, TaskState, TaskStatus};
use fsgrid_scheduler::{ClusterEvent, TaskInfo};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{MesosError, MesosResult};

/// Seconds an offer declined by us stays away from this framework.
pub const DECLINE_REFUSE_SECONDS: f64 = 5.0;
/// Same, for the remainder of an offer a task was launched on.
pub const LAUNCH_REFUSE_SECONDS: f64 = 1.0;

// ── Incoming ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Id {
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Subscribed,
    Offers,
    InverseOffers,
    Rescind,
    RescindInverseOffer,
    Update,
    UpdateOperationStatus,
    Message,
    Failure,
    Error,
    Heartbeat,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub subscribed: Option<Subscribed>,
    pub offers: Option<Offers>,
    pub rescind: Option<Rescind>,
    pub update: Option<Update>,
    pub message: Option<Message>,
    pub failure: Option<Failure>,
    pub error: Option<ErrorEvent>,
}

#[derive(Debug, Deserialize)]
pub struct Subscribed {
    pub framework_id: Id,
    pub heartbeat_interval_seconds: Option<f64>,
    pub master_info: Option<WireMasterInfo>,
}

#[derive(Debug, Deserialize)]
pub struct WireMasterInfo {
    pub id: String,
    pub hostname: Option<String>,
    pub port: u32,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Offers {
    #[serde(default)]
    pub offers: Vec<WireOffer>,
}

#[derive(Debug, Deserialize)]
pub struct WireOffer {
    pub id: Id,
    pub framework_id: Id,
    pub agent_id: Id,
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<WireResource>,
    #[serde(default)]
    pub attributes: Vec<WireAttribute>,
}

#[derive(Debug, Deserialize)]
pub struct Scalar {
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct Text {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct WireRange {
    pub begin: u64,
    pub end: u64,
}

#[derive(Debug, Deserialize)]
pub struct Ranges {
    #[serde(default)]
    pub range: Vec<WireRange>,
}

#[derive(Debug, Deserialize)]
pub struct Set {
    #[serde(default)]
    pub item: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireResource {
    pub name: String,
    pub role: Option<String>,
    pub scalar: Option<Scalar>,
    pub ranges: Option<Ranges>,
    pub set: Option<Set>,
}

#[derive(Debug, Deserialize)]
pub struct WireAttribute {
    pub name: String,
    pub text: Option<Text>,
    pub scalar: Option<Scalar>,
    pub ranges: Option<Ranges>,
    pub set: Option<Set>,
}

#[derive(Debug, Deserialize)]
pub struct Rescind {
    pub offer_id: Id,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub status: WireTaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct WireTaskStatus {
    pub task_id: Id,
    pub state: String,
    pub agent_id: Option<Id>,
    pub message: Option<String>,
    pub reason: Option<String>,
    /// Base64; present when the update must be acknowledged.
    pub uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub agent_id: Id,
    pub executor_id: Id,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct Failure {
    pub agent_id: Option<Id>,
    pub executor_id: Option<Id>,
    pub status: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

impl Event {
    pub fn decode(data: &[u8]) -> MesosResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Map to the scheduler's event. `first_subscription` tells a fresh
    /// registration from a re-registration. Events the scheduler has no
    /// use for map to `None`.
    pub fn into_cluster_event(self, first_subscription: bool) -> MesosResult<Option<ClusterEvent>> {
        let event = match self.kind {
            EventType::Subscribed => {
                let subscribed = required(self.subscribed, "subscribed")?;
                let master = subscribed
                    .master_info
                    .map(master_info)
                    .transpose()?
                    .unwrap_or_default();
                if first_subscription {
                    ClusterEvent::Registered {
                        framework_id: subscribed.framework_id.value,
                        master,
                    }
                } else {
                    ClusterEvent::Reregistered { master }
                }
            }
            EventType::Offers => {
                let offers = required(self.offers, "offers")?;
                let offers = offers
                    .offers
                    .into_iter()
                    .map(offer)
                    .collect::<MesosResult<Vec<_>>>()?;
                ClusterEvent::Offers(offers)
            }
            EventType::Rescind => {
                ClusterEvent::OfferRescinded(required(self.rescind, "rescind")?.offer_id.value)
            }
            EventType::Update => {
                let update = required(self.update, "update")?;
                ClusterEvent::Status(task_status(update.status)?)
            }
            EventType::Message => {
                let message = required(self.message, "message")?;
                let data = STANDARD
                    .decode(message.data.as_bytes())
                    .map_err(|e| MesosError::Protocol(format!("message data: {e}")))?;
                ClusterEvent::FrameworkMessage {
                    executor_id: message.executor_id.value,
                    slave_id: message.agent_id.value,
                    data,
                }
            }
            EventType::Failure => {
                let failure = required(self.failure, "failure")?;
                match (failure.agent_id, failure.executor_id) {
                    (Some(agent), None) => ClusterEvent::SlaveLost(agent.value),
                    _ => return Ok(None),
                }
            }
            EventType::Error => ClusterEvent::Error(required(self.error, "error")?.message),
            EventType::Heartbeat
            | EventType::InverseOffers
            | EventType::RescindInverseOffer
            | EventType::UpdateOperationStatus
            | EventType::Unknown => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn required<T>(field: Option<T>, name: &str) -> MesosResult<T> {
    field.ok_or_else(|| MesosError::Protocol(format!("event without {name}")))
}

fn master_info(info: WireMasterInfo) -> MesosResult<MasterInfo> {
    let port = u16::try_from(info.port)
        .map_err(|_| MesosError::Protocol(format!("invalid master port {}", info.port)))?;
    Ok(MasterInfo {
        id: info.id,
        hostname: info.hostname.unwrap_or_default(),
        port,
        version: info.version,
    })
}

fn ranges(ranges: Ranges) -> MesosResult<Vec<Range>> {
    ranges
        .range
        .into_iter()
        .map(|r| {
            let start = u32::try_from(r.begin).ok();
            let end = u32::try_from(r.end).ok();
            match (start, end) {
                (Some(start), Some(end)) => {
                    Range::new(start, end).map_err(|e| MesosError::Protocol(e.to_string()))
                }
                _ => Err(MesosError::Protocol(format!("range out of bounds: {}..{}", r.begin, r.end))),
            }
        })
        .collect()
}

fn resource(resource: WireResource) -> MesosResult<Resource> {
    let value = if let Some(scalar) = resource.scalar {
        ResourceValue::Scalar(scalar.value)
    } else if let Some(r) = resource.ranges {
        ResourceValue::Ranges(ranges(r)?)
    } else if let Some(set) = resource.set {
        ResourceValue::Set(set.item)
    } else {
        return Err(MesosError::Protocol(format!("resource {} without value", resource.name)));
    };

    Ok(Resource {
        name: resource.name,
        role: resource.role.unwrap_or_else(|| ANY_ROLE.to_string()),
        value,
    })
}

fn attribute(attribute: WireAttribute) -> MesosResult<Attribute> {
    let value = if let Some(text) = attribute.text {
        text.value
    } else if let Some(scalar) = attribute.scalar {
        scalar.value.to_string()
    } else if let Some(r) = attribute.ranges {
        ranges(r)?
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    } else if let Some(set) = attribute.set {
        set.item.join(",")
    } else {
        String::new()
    };

    Ok(Attribute {
        name: attribute.name,
        value,
    })
}

fn offer(offer: WireOffer) -> MesosResult<Offer> {
    Ok(Offer {
        id: offer.id.value,
        framework_id: offer.framework_id.value,
        slave_id: offer.agent_id.value,
        hostname: offer.hostname,
        resources: offer
            .resources
            .into_iter()
            .map(resource)
            .collect::<MesosResult<_>>()?,
        attributes: offer
            .attributes
            .into_iter()
            .map(attribute)
            .collect::<MesosResult<_>>()?,
    })
}

fn task_status(status: WireTaskStatus) -> MesosResult<TaskStatus> {
    let state = TaskState::from_wire(&status.state)
        .ok_or_else(|| MesosError::Protocol(format!("unknown task state {}", status.state)))?;
    Ok(TaskStatus {
        task_id: status.task_id.value,
        state,
        slave_id: status.agent_id.map(|id| id.value),
        message: status.message,
        reason: status.reason,
        uuid: status.uuid,
    })
}

// ── Outgoing ───────────────────────────────────────────────────────

/// Framework identity sent on SUBSCRIBE.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameworkInfo {
    pub user: String,
    pub name: String,
    pub role: String,
    pub failover_timeout_secs: f64,
    pub principal: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Subscribe(FrameworkInfo),
    Decline {
        offer_id: String,
    },
    Launch {
        offer_id: String,
        task: TaskInfo,
    },
    Kill {
        task_id: String,
    },
    /// Empty asks for every task of the framework.
    Reconcile {
        tasks: Vec<TaskStatus>,
    },
    Acknowledge {
        agent_id: String,
        task_id: String,
        uuid: String,
    },
    Teardown,
}

fn id(value: &str) -> Value {
    json!({ "value": value })
}

impl Call {
    pub fn kind(&self) -> &'static str {
        match self {
            Call::Subscribe(_) => "SUBSCRIBE",
            Call::Decline { .. } => "DECLINE",
            Call::Launch { .. } => "ACCEPT",
            Call::Kill { .. } => "KILL",
            Call::Reconcile { .. } => "RECONCILE",
            Call::Acknowledge { .. } => "ACKNOWLEDGE",
            Call::Teardown => "TEARDOWN",
        }
    }

    pub fn to_json(&self, framework_id: Option<&str>) -> Value {
        let mut call = json!({ "type": self.kind() });
        if let Some(framework_id) = framework_id {
            call["framework_id"] = id(framework_id);
        }

        match self {
            Call::Subscribe(info) => {
                let mut framework = json!({
                    "user": info.user,
                    "name": info.name,
                    "role": info.role,
                    "failover_timeout": info.failover_timeout_secs,
                    "checkpoint": true,
                });
                if let Some(framework_id) = framework_id {
                    framework["id"] = id(framework_id);
                }
                if let Some(principal) = &info.principal {
                    framework["principal"] = json!(principal);
                }
                call["subscribe"] = json!({ "framework_info": framework });
            }
            Call::Decline { offer_id } => {
                call["decline"] = json!({
                    "offer_ids": [id(offer_id)],
                    "filters": { "refuse_seconds": DECLINE_REFUSE_SECONDS },
                });
            }
            Call::Launch { offer_id, task } => {
                call["accept"] = json!({
                    "offer_ids": [id(offer_id)],
                    "operations": [{
                        "type": "LAUNCH",
                        "launch": { "task_infos": [task_info(task)] },
                    }],
                    "filters": { "refuse_seconds": LAUNCH_REFUSE_SECONDS },
                });
            }
            Call::Kill { task_id } => {
                call["kill"] = json!({ "task_id": id(task_id) });
            }
            Call::Reconcile { tasks } => {
                let tasks: Vec<Value> = tasks
                    .iter()
                    .map(|t| {
                        let mut task = json!({ "task_id": id(&t.task_id) });
                        if let Some(agent) = &t.slave_id {
                            task["agent_id"] = id(agent);
                        }
                        task
                    })
                    .collect();
                call["reconcile"] = json!({ "tasks": tasks });
            }
            Call::Acknowledge {
                agent_id,
                task_id,
                uuid,
            } => {
                call["acknowledge"] = json!({
                    "agent_id": id(agent_id),
                    "task_id": id(task_id),
                    "uuid": uuid,
                });
            }
            Call::Teardown => {}
        }
        call
    }
}

fn resource_json(resource: &Resource) -> Value {
    let mut value = json!({ "name": resource.name, "role": resource.role });
    match &resource.value {
        ResourceValue::Scalar(v) => {
            value["type"] = json!("SCALAR");
            value["scalar"] = json!({ "value": v });
        }
        ResourceValue::Ranges(ranges) => {
            let range: Vec<Value> = ranges
                .iter()
                .map(|r| json!({ "begin": r.start(), "end": r.end() }))
                .collect();
            value["type"] = json!("RANGES");
            value["ranges"] = json!({ "range": range });
        }
        ResourceValue::Set(items) => {
            value["type"] = json!("SET");
            value["set"] = json!({ "item": items });
        }
    }
    value
}

fn task_info(task: &TaskInfo) -> Value {
    let uris: Vec<Value> = task
        .executor
        .command
        .uris
        .iter()
        .map(|u| json!({ "value": u.value, "extract": u.extract }))
        .collect();

    json!({
        "name": task.name,
        "task_id": id(&task.task_id),
        "agent_id": id(&task.slave_id),
        "resources": task.resources.iter().map(resource_json).collect::<Vec<_>>(),
        "executor": {
            "type": "CUSTOM",
            "executor_id": id(&task.executor.executor_id),
            "name": task.executor.name,
            "command": {
                "value": task.executor.command.value,
                "shell": true,
                "uris": uris,
            },
        },
        "data": STANDARD.encode(&task.data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsgrid_scheduler::{CommandInfo, CommandUri, ExecutorInfo};

    #[test]
    fn decodes_subscribed() {
        let data = br#"{
            "type": "SUBSCRIBED",
            "subscribed": {
                "framework_id": {"value": "fw-1"},
                "heartbeat_interval_seconds": 15,
                "master_info": {"id": "m1", "ip": 16777343, "port": 5050, "hostname": "master", "version": "1.11.0"}
            }
        }"#;

        let event = Event::decode(data).unwrap();
        assert_eq!(event.subscribed.as_ref().unwrap().heartbeat_interval_seconds, Some(15.0));

        let expected_master = MasterInfo {
            id: "m1".into(),
            hostname: "master".into(),
            port: 5050,
            version: Some("1.11.0".into()),
        };
        assert_eq!(
            Event::decode(data).unwrap().into_cluster_event(true).unwrap(),
            Some(ClusterEvent::Registered {
                framework_id: "fw-1".into(),
                master: expected_master.clone(),
            })
        );
        assert_eq!(
            event.into_cluster_event(false).unwrap(),
            Some(ClusterEvent::Reregistered {
                master: expected_master
            })
        );
    }

    #[test]
    fn decodes_offers() {
        let data = br#"{
            "type": "OFFERS",
            "offers": {"offers": [{
                "id": {"value": "o1"},
                "framework_id": {"value": "fw"},
                "agent_id": {"value": "a1"},
                "hostname": "slave1",
                "resources": [
                    {"name": "cpus", "type": "SCALAR", "scalar": {"value": 2.0}, "role": "*"},
                    {"name": "mem", "type": "SCALAR", "scalar": {"value": 2048}, "role": "hdfs"},
                    {"name": "ports", "type": "RANGES", "ranges": {"range": [{"begin": 31000, "end": 31005}, {"begin": 31010, "end": 31010}]}}
                ],
                "attributes": [
                    {"name": "rack", "type": "TEXT", "text": {"value": "r1"}},
                    {"name": "level", "type": "SCALAR", "scalar": {"value": 3}}
                ]
            }]}
        }"#;

        let Some(ClusterEvent::Offers(offers)) = Event::decode(data).unwrap().into_cluster_event(true).unwrap() else {
            panic!("expected offers");
        };
        let offer = &offers[0];
        assert_eq!(offer.id, "o1");
        assert_eq!(offer.slave_id, "a1");
        assert_eq!(offer.hostname, "slave1");
        assert_eq!(offer.scalar("cpus"), Some(2.0));
        assert_eq!(offer.resources[1].role, "hdfs");
        assert_eq!(
            offer.ranges("ports"),
            vec![Range::new(31000, 31005).unwrap(), Range::point(31010)]
        );
        assert_eq!(offer.attribute("rack"), Some("r1"));
        assert_eq!(offer.attribute("level"), Some("3"));
    }

    #[test]
    fn decodes_update() {
        let data = br#"{
            "type": "UPDATE",
            "update": {"status": {
                "task_id": {"value": "t1"},
                "state": "TASK_FAILED",
                "agent_id": {"value": "a1"},
                "message": "boom",
                "reason": "REASON_COMMAND_EXECUTOR_FAILED",
                "uuid": "AAEC"
            }}
        }"#;

        let Some(ClusterEvent::Status(status)) = Event::decode(data).unwrap().into_cluster_event(true).unwrap() else {
            panic!("expected status");
        };
        assert_eq!(status.task_id, "t1");
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.slave_id.as_deref(), Some("a1"));
        assert_eq!(status.message.as_deref(), Some("boom"));
        assert_eq!(status.uuid.as_deref(), Some("AAEC"));
    }

    #[test]
    fn decodes_message_and_failures() {
        let data = br#"{"type": "MESSAGE", "message": {"agent_id": {"value": "a1"}, "executor_id": {"value": "e1"}, "data": "aGVsbG8="}}"#;
        assert_eq!(
            Event::decode(data).unwrap().into_cluster_event(true).unwrap(),
            Some(ClusterEvent::FrameworkMessage {
                executor_id: "e1".into(),
                slave_id: "a1".into(),
                data: b"hello".to_vec(),
            })
        );

        let lost = br#"{"type": "FAILURE", "failure": {"agent_id": {"value": "a1"}}}"#;
        assert_eq!(
            Event::decode(lost).unwrap().into_cluster_event(true).unwrap(),
            Some(ClusterEvent::SlaveLost("a1".into()))
        );

        let executor = br#"{"type": "FAILURE", "failure": {"agent_id": {"value": "a1"}, "executor_id": {"value": "e1"}, "status": 1}}"#;
        assert_eq!(Event::decode(executor).unwrap().into_cluster_event(true).unwrap(), None);
    }

    #[test]
    fn heartbeats_and_unknown_events_are_skipped() {
        for data in [&br#"{"type": "HEARTBEAT"}"#[..], br#"{"type": "SOMETHING_NEW"}"#] {
            assert_eq!(Event::decode(data).unwrap().into_cluster_event(true).unwrap(), None);
        }
    }

    #[test]
    fn rejects_unknown_task_state() {
        let data = br#"{"type": "UPDATE", "update": {"status": {"task_id": {"value": "t1"}, "state": "TASK_BOGUS"}}}"#;
        assert!(Event::decode(data).unwrap().into_cluster_event(true).is_err());
    }

    #[test]
    fn encodes_subscribe() {
        let call = Call::Subscribe(FrameworkInfo {
            user: "hdfs".into(),
            name: "hdfs".into(),
            role: "*".into(),
            failover_timeout_secs: 2_592_000.0,
            principal: Some("fw-principal".into()),
        });

        let json = call.to_json(Some("fw-1"));
        assert_eq!(json["type"], "SUBSCRIBE");
        assert_eq!(json["framework_id"]["value"], "fw-1");
        let framework = &json["subscribe"]["framework_info"];
        assert_eq!(framework["id"]["value"], "fw-1");
        assert_eq!(framework["checkpoint"], true);
        assert_eq!(framework["principal"], "fw-principal");
        assert_eq!(framework["failover_timeout"], 2_592_000.0);

        let json = call.to_json(None);
        assert!(json.get("framework_id").is_none());
        assert!(json["subscribe"]["framework_info"].get("id").is_none());
    }

    #[test]
    fn encodes_launch() {
        let task = TaskInfo {
            task_id: "t1".into(),
            name: "hdfs-nn".into(),
            slave_id: "a1".into(),
            executor: ExecutorInfo {
                executor_id: "e1".into(),
                name: "hdfs-nn".into(),
                command: CommandInfo {
                    value: "./fsgrid-executor".into(),
                    uris: vec![CommandUri {
                        value: "http://api/hadoop/hadoop-2.7.tar.gz".into(),
                        extract: true,
                    }],
                },
            },
            resources: vec![
                Resource::scalar("cpus", 0.5),
                Resource::ranges("ports", vec![Range::point(31000)]),
            ],
            data: b"{}".to_vec(),
        };

        let json = Call::Launch {
            offer_id: "o1".into(),
            task,
        }
        .to_json(Some("fw"));

        assert_eq!(json["type"], "ACCEPT");
        let accept = &json["accept"];
        assert_eq!(accept["offer_ids"][0]["value"], "o1");
        assert_eq!(accept["filters"]["refuse_seconds"], 1.0);
        assert_eq!(accept["operations"][0]["type"], "LAUNCH");

        let task = &accept["operations"][0]["launch"]["task_infos"][0];
        assert_eq!(task["task_id"]["value"], "t1");
        assert_eq!(task["agent_id"]["value"], "a1");
        assert_eq!(task["data"], "e30=");
        assert_eq!(task["resources"][0]["type"], "SCALAR");
        assert_eq!(task["resources"][0]["scalar"]["value"], 0.5);
        assert_eq!(task["resources"][1]["ranges"]["range"][0]["begin"], 31000);
        assert_eq!(task["resources"][1]["ranges"]["range"][0]["end"], 31000);
        assert_eq!(task["executor"]["command"]["uris"][0]["extract"], true);
    }

    #[test]
    fn encodes_reconcile() {
        let json = Call::Reconcile { tasks: vec![] }.to_json(Some("fw"));
        assert_eq!(json["reconcile"]["tasks"], json!([]));

        let mut status = TaskStatus::new("t1", TaskState::Running);
        status.slave_id = Some("a1".into());
        let json = Call::Reconcile {
            tasks: vec![status, TaskStatus::new("t2", TaskState::Running)],
        }
        .to_json(Some("fw"));
        assert_eq!(
            json["reconcile"]["tasks"],
            json!([
                {"task_id": {"value": "t1"}, "agent_id": {"value": "a1"}},
                {"task_id": {"value": "t2"}}
            ])
        );
    }

    #[test]
    fn encodes_kill_acknowledge_teardown() {
        let json = Call::Kill { task_id: "t1".into() }.to_json(Some("fw"));
        assert_eq!(json["kill"]["task_id"]["value"], "t1");

        let json = Call::Acknowledge {
            agent_id: "a1".into(),
            task_id: "t1".into(),
            uuid: "AAEC".into(),
        }
        .to_json(Some("fw"));
        assert_eq!(json["acknowledge"]["uuid"], "AAEC");

        let json = Call::Teardown.to_json(Some("fw"));
        assert_eq!(json, json!({"type": "TEARDOWN", "framework_id": {"value": "fw"}}));
    }
}
