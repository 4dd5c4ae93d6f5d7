//! Client against an in-process master speaking the v1 scheduler API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use fsgrid_core::TaskState;
use fsgrid_mesos::recordio::encode_record;
use fsgrid_mesos::{Endpoint, FrameworkInfo, MesosClient, MesosConfig};
use fsgrid_scheduler::ClusterEvent;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone)]
struct Recorded {
    body: Value,
    stream_id: Option<String>,
    auth: Option<String>,
}

#[derive(Clone, Default)]
struct Master {
    calls: Arc<Mutex<Vec<Recorded>>>,
}

impl Master {
    fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }
}

fn subscription_stream() -> Vec<u8> {
    let events = [
        json!({
            "type": "SUBSCRIBED",
            "subscribed": {
                "framework_id": {"value": "fw-1"},
                "heartbeat_interval_seconds": 15,
                "master_info": {"id": "m1", "ip": 0, "port": 5050, "hostname": "master", "version": "1.11.0"}
            }
        }),
        json!({"type": "HEARTBEAT"}),
        json!({
            "type": "OFFERS",
            "offers": {"offers": [{
                "id": {"value": "o1"},
                "framework_id": {"value": "fw-1"},
                "agent_id": {"value": "a1"},
                "hostname": "slave1",
                "resources": [{"name": "cpus", "type": "SCALAR", "scalar": {"value": 1}}]
            }]}
        }),
        json!({
            "type": "UPDATE",
            "update": {"status": {
                "task_id": {"value": "t1"},
                "state": "TASK_RUNNING",
                "agent_id": {"value": "a1"},
                "uuid": "AAEC"
            }}
        }),
    ];

    let mut stream = Vec::new();
    for event in events {
        stream.extend(encode_record(event.to_string().as_bytes()));
    }
    stream
}

async fn scheduler_api(State(master): State<Master>, headers: HeaderMap, body: Bytes) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap();
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    let subscribe = body["type"] == "SUBSCRIBE";

    master.calls.lock().unwrap().push(Recorded {
        body,
        stream_id: header("mesos-stream-id"),
        auth: header("authorization"),
    });

    if subscribe {
        Response::builder()
            .status(StatusCode::OK)
            .header("Mesos-Stream-Id", "stream-1")
            .body(Body::from(subscription_stream()))
            .unwrap()
    } else {
        StatusCode::ACCEPTED.into_response()
    }
}

async fn start_master() -> (Master, u16) {
    let master = Master::default();
    let router = Router::new()
        .route("/api/v1/scheduler", post(scheduler_api))
        .with_state(master.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (master, port)
}

async fn next_event(events: &mut mpsc::Receiver<ClusterEvent>) -> ClusterEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

#[tokio::test]
async fn subscribes_delivers_events_and_resubscribes() {
    let (master, port) = start_master().await;

    let config = MesosConfig {
        master: Endpoint {
            host: "127.0.0.1".into(),
            port,
        },
        framework: FrameworkInfo {
            user: "hdfs".into(),
            name: "hdfs".into(),
            role: "*".into(),
            failover_timeout_secs: 60.0,
            principal: Some("p".into()),
        },
        framework_id: None,
        credentials: Some(("p".into(), "s".into())),
    };
    let (client, driver) = MesosClient::new(config);
    let (events_tx, mut events) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(client.run(events_tx, shutdown_rx));

    match next_event(&mut events).await {
        ClusterEvent::Registered {
            framework_id,
            master,
        } => {
            assert_eq!(framework_id, "fw-1");
            assert_eq!(master.version.as_deref(), Some("1.11.0"));
        }
        other => panic!("unexpected {other:?}"),
    }

    match next_event(&mut events).await {
        ClusterEvent::Offers(offers) => {
            assert_eq!(offers.len(), 1);
            assert_eq!(offers[0].id, "o1");
            assert_eq!(offers[0].scalar("cpus"), Some(1.0));
        }
        other => panic!("unexpected {other:?}"),
    }

    match next_event(&mut events).await {
        ClusterEvent::Status(status) => {
            assert_eq!(status.task_id, "t1");
            assert_eq!(status.state, TaskState::Running);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(next_event(&mut events).await, ClusterEvent::Disconnected);
    assert!(matches!(
        next_event(&mut events).await,
        ClusterEvent::Reregistered { .. }
    ));

    let calls = master.calls();
    assert!(calls.len() >= 3);

    assert_eq!(calls[0].body["type"], "SUBSCRIBE");
    assert!(calls[0].body.get("framework_id").is_none());
    assert_eq!(calls[0].auth.as_deref(), Some("Basic cDpz"));
    assert_eq!(calls[0].stream_id, None);

    assert_eq!(calls[1].body["type"], "ACKNOWLEDGE");
    assert_eq!(calls[1].body["acknowledge"]["uuid"], "AAEC");
    assert_eq!(calls[1].body["framework_id"]["value"], "fw-1");
    assert_eq!(calls[1].stream_id.as_deref(), Some("stream-1"));

    assert_eq!(calls[2].body["type"], "SUBSCRIBE");
    assert_eq!(calls[2].body["framework_id"]["value"], "fw-1");
    assert_eq!(
        calls[2].body["subscribe"]["framework_info"]["id"]["value"],
        "fw-1"
    );

    drop(driver);
    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
