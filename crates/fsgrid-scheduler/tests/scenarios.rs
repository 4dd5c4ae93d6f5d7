//! End-to-end scheduler scenarios: events in, driver calls and node
//! states out.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fsgrid_core::offer::parse_resources;
use fsgrid_core::{MasterInfo, Offer, TaskState, TaskStatus};
use fsgrid_placement::{ClusterView, matches};
use fsgrid_scheduler::{ClusterEvent, Reconciler, Scheduler, TaskSettings, TestDriver};
use fsgrid_state::node::{PORT_DATA, PORT_HTTP, PORT_IPC};
use fsgrid_state::{Node, NodeState, NodeType, RedbStorage, Registry, Reservation, Runtime, SharedRegistry};

fn offer(id: &str, resources: &str) -> Offer {
    Offer {
        id: id.into(),
        framework_id: "fw".into(),
        slave_id: format!("slave-{id}"),
        hostname: format!("host-{id}"),
        resources: parse_resources(resources).unwrap(),
        attributes: vec![],
    }
}

fn runtime(task_id: &str, hostname: &str) -> Runtime {
    Runtime {
        task_id: task_id.into(),
        executor_id: format!("{task_id}-executor"),
        slave_id: format!("slave-{hostname}"),
        hostname: hostname.into(),
        attributes: BTreeMap::new(),
        fs_uri: None,
        kill_sent: false,
    }
}

fn running_namenode(registry: &mut Registry) {
    let nn = registry.add_node(Node::new("nn", NodeType::Namenode)).unwrap();
    nn.attach_runtime(
        runtime("task-nn", "master"),
        Reservation {
            cpus: 0.5,
            mem: 512,
            ports: BTreeMap::from([(PORT_HTTP.to_string(), 50070), (PORT_IPC.to_string(), 8020)]),
        },
    );
    nn.state = NodeState::Running;
}

fn starting_datanode(registry: &mut Registry, id: &str) {
    let dn = registry.add_node(Node::new(id, NodeType::Datanode)).unwrap();
    dn.cpus = 0.5;
    dn.mem = 500;
    dn.start().unwrap();
}

fn scheduler(registry: Registry, max_tries: u32) -> (Scheduler, Arc<TestDriver>) {
    let storage = Arc::new(RedbStorage::open_in_memory().unwrap());
    let driver = Arc::new(TestDriver::new());
    let scheduler = Scheduler::new(
        SharedRegistry::new(registry, storage),
        driver.clone(),
        Reconciler::new("30s".parse().unwrap(), max_tries),
        TaskSettings::default(),
    );
    (scheduler, driver)
}

#[tokio::test]
async fn offer_launches_datanode_with_running_namenode() {
    let mut registry = Registry::new();
    running_namenode(&mut registry);
    starting_datanode(&mut registry, "dn0");
    let (mut scheduler, driver) = scheduler(registry, 3);

    scheduler
        .handle_at(ClusterEvent::Offers(vec![offer("o1", "cpus:2;mem:2048;ports:0..10")]), 0)
        .await
        .unwrap();

    assert_eq!(driver.accepted_offers(), vec!["o1"]);
    assert!(driver.declined_offers().is_empty());

    let registry = scheduler.registry().lock().await;
    let dn = registry.node("dn0").unwrap();
    assert_eq!(dn.state, NodeState::Starting);

    let runtime = dn.runtime().unwrap();
    assert_eq!(runtime.hostname, "host-o1");
    assert_eq!(runtime.fs_uri.as_deref(), Some("hdfs://master:8020"));

    let reservation = dn.reservation().unwrap();
    assert_eq!(reservation.cpus, 0.5);
    assert_eq!(reservation.mem, 500);

    let names: BTreeSet<&str> = reservation.ports.keys().map(String::as_str).collect();
    assert_eq!(names, BTreeSet::from([PORT_HTTP, PORT_IPC, PORT_DATA]));
    let ports: BTreeSet<u32> = reservation.ports.values().copied().collect();
    assert_eq!(ports.len(), 3);
    assert!(ports.iter().all(|p| *p <= 10));

    let task = &driver.launched_tasks()[0];
    assert_eq!(task.task_id, runtime.task_id);
    assert_eq!(task.name, "hdfs-dn0");
    assert_eq!(task.slave_id, "slave-o1");
}

#[tokio::test]
async fn offer_declined_without_namenode() {
    let mut registry = Registry::new();
    starting_datanode(&mut registry, "dn0");
    let offer = offer("o1", "cpus:2;mem:2048;ports:0..10");

    let node = registry.node("dn0").unwrap();
    assert_eq!(
        matches(node, &offer, &ClusterView::of(&registry, node), 0).as_deref(),
        Some("no namenode")
    );

    let before = registry.clone();
    let (mut scheduler, driver) = scheduler(registry, 3);
    scheduler
        .handle_at(ClusterEvent::Offers(vec![offer]), 0)
        .await
        .unwrap();

    assert_eq!(driver.declined_offers(), vec!["o1"]);
    assert!(driver.launched_tasks().is_empty());
    assert_eq!(*scheduler.registry().lock().await, before);
}

#[tokio::test]
async fn finished_task_restarts_running_node() {
    let mut registry = Registry::new();
    running_namenode(&mut registry);
    let (mut scheduler, driver) = scheduler(registry, 3);

    scheduler
        .handle_at(ClusterEvent::Status(TaskStatus::new("task-nn", TaskState::Finished)), 1_000)
        .await
        .unwrap();

    let registry = scheduler.registry().lock().await;
    let nn = registry.node("nn").unwrap();
    assert_eq!(nn.state, NodeState::Starting);
    assert!(nn.runtime().is_none());
    assert!(nn.reservation().is_none());
    assert!(driver.killed_tasks().is_empty());
}

#[tokio::test]
async fn failed_task_idles_stopping_node() {
    let mut registry = Registry::new();
    running_namenode(&mut registry);
    registry.require_mut("nn").unwrap().stop().unwrap();
    let (mut scheduler, _driver) = scheduler(registry, 3);

    scheduler
        .handle_at(ClusterEvent::Status(TaskStatus::new("task-nn", TaskState::Failed)), 1_000)
        .await
        .unwrap();

    let registry = scheduler.registry().lock().await;
    let nn = registry.node("nn").unwrap();
    assert_eq!(nn.state, NodeState::Idle);
    assert!(nn.runtime().is_none());
    assert!(nn.reservation().is_none());
    assert_eq!(nn.stickiness.stop_time(), None);
}

#[tokio::test]
async fn killed_task_leaves_stickiness_checkpoint() {
    let mut registry = Registry::new();
    running_namenode(&mut registry);
    registry.require_mut("nn").unwrap().stop().unwrap();
    let (mut scheduler, _driver) = scheduler(registry, 3);

    scheduler
        .handle_at(ClusterEvent::Status(TaskStatus::new("task-nn", TaskState::Killed)), 1_000)
        .await
        .unwrap();

    let registry = scheduler.registry().lock().await;
    let nn = registry.node("nn").unwrap();
    assert_eq!(nn.state, NodeState::Idle);
    assert_eq!(nn.stickiness.hostname(), Some("master"));
    assert_eq!(nn.stickiness.stop_time(), Some(1_000));
}

#[tokio::test]
async fn reconciliation_gives_up_after_max_tries() {
    let mut registry = Registry::new();
    running_namenode(&mut registry);
    let dn = registry.add_node(Node::new("dn0", NodeType::Datanode)).unwrap();
    dn.attach_runtime(runtime("task-dn0", "worker"), Reservation::default());
    dn.state = NodeState::Running;
    let (mut scheduler, driver) = scheduler(registry, 2);

    let master = MasterInfo {
        id: "master".into(),
        hostname: "master".into(),
        port: 5050,
        version: Some("0.23.0".into()),
    };
    scheduler
        .handle_at(ClusterEvent::Reregistered { master }, 0)
        .await
        .unwrap();
    assert!(Reconciler::is_active(&*scheduler.registry().lock().await));
    assert_eq!(driver.reconciled_tasks(), vec![""]);

    scheduler.tick_at(30_000).await.unwrap();
    scheduler.tick_at(60_000).await.unwrap();
    assert_eq!(driver.reconcile_calls(), 5);

    driver.clear();
    scheduler.tick_at(90_000).await.unwrap();
    assert_eq!(driver.reconcile_calls(), 0);

    let registry = scheduler.registry().lock().await;
    assert!(!Reconciler::is_active(&registry));
    for id in ["nn", "dn0"] {
        let node = registry.node(id).unwrap();
        assert_eq!(node.state, NodeState::Starting);
        assert!(node.runtime().is_none());
        assert!(node.reservation().is_none());
    }
    assert_eq!(driver.killed_tasks(), vec!["task-nn", "task-dn0"]);
}

#[tokio::test]
async fn confirmed_tasks_end_reconciliation() {
    let mut registry = Registry::new();
    running_namenode(&mut registry);
    starting_datanode(&mut registry, "dn0");
    let (mut scheduler, driver) = scheduler(registry, 3);

    let master = MasterInfo {
        id: "master".into(),
        hostname: "master".into(),
        port: 5050,
        version: Some("1.4.0".into()),
    };
    scheduler
        .handle_at(
            ClusterEvent::Registered {
                framework_id: "fw".into(),
                master,
            },
            0,
        )
        .await
        .unwrap();

    scheduler
        .handle_at(ClusterEvent::Offers(vec![offer("o1", "cpus:2;mem:2048;ports:0..10")]), 10)
        .await
        .unwrap();
    assert_eq!(driver.declined_offers(), vec!["o1"]);

    scheduler
        .handle_at(ClusterEvent::Status(TaskStatus::new("task-nn", TaskState::Running)), 20)
        .await
        .unwrap();
    assert!(!Reconciler::is_active(&*scheduler.registry().lock().await));

    scheduler
        .handle_at(ClusterEvent::Offers(vec![offer("o2", "cpus:2;mem:2048;ports:0..10")]), 30)
        .await
        .unwrap();
    assert_eq!(driver.accepted_offers(), vec!["o2"]);
    assert_eq!(scheduler.registry().lock().await.framework_id(), Some("fw"));
}
