//! Building the task that runs a node.
//!
//! The task carries the node's reservation as resources and a snapshot
//! of the node (schema JSON) as payload for the executor.

use fsgrid_core::offer::{ANY_ROLE, CPUS, MEM, PORTS};
use fsgrid_core::{Range, Resource, ResourceValue};
use fsgrid_state::schema::NodeRecord;
use fsgrid_state::{Node, Reservation};

use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub task_id: String,
    pub name: String,
    pub slave_id: String,
    pub executor: ExecutorInfo,
    pub resources: Vec<Resource>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorInfo {
    pub executor_id: String,
    pub name: String,
    pub command: CommandInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandInfo {
    pub value: String,
    pub uris: Vec<CommandUri>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandUri {
    pub value: String,
    pub extract: bool,
}

/// Scheduler-wide inputs to task construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSettings {
    /// Public URL of the management API, which serves the artifacts.
    pub api: String,
    /// File name of the executor artifact, served under `/jar/`.
    pub jar: Option<String>,
    /// File name of the filesystem distribution, served under `/hadoop/`.
    pub hadoop: Option<String>,
    pub executor_command: String,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            api: "http://localhost:7000".to_string(),
            jar: None,
            hadoop: None,
            executor_command: "./fsgrid-executor".to_string(),
        }
    }
}

pub fn task_name(node: &Node) -> String {
    format!("hdfs-{}", node.id)
}

/// Task for a node that already has a runtime.
pub fn new_task(node: &Node, settings: &TaskSettings) -> SchedulerResult<TaskInfo> {
    let (Some(runtime), Some(reservation)) = (node.runtime(), node.reservation()) else {
        return Err(SchedulerError::Encode(format!("node {} has no runtime", node.id)));
    };

    let data = serde_json::to_vec(&NodeRecord::from(node))
        .map_err(|e| SchedulerError::Encode(e.to_string()))?;

    Ok(TaskInfo {
        task_id: runtime.task_id.clone(),
        name: task_name(node),
        slave_id: runtime.slave_id.clone(),
        executor: new_executor(node, &runtime.executor_id, settings),
        resources: to_resources(reservation),
        data,
    })
}

fn new_executor(node: &Node, executor_id: &str, settings: &TaskSettings) -> ExecutorInfo {
    let api = settings.api.trim_end_matches('/');

    let mut uris = Vec::new();
    if let Some(jar) = &settings.jar {
        uris.push(CommandUri {
            value: format!("{api}/jar/{jar}"),
            extract: false,
        });
    }
    if let Some(hadoop) = &settings.hadoop {
        uris.push(CommandUri {
            value: format!("{api}/hadoop/{hadoop}"),
            extract: true,
        });
    }

    let mut value = settings.executor_command.clone();
    if let Some(opts) = &node.executor_jvm_opts {
        value.push(' ');
        value.push_str(opts);
    }

    ExecutorInfo {
        executor_id: executor_id.to_string(),
        name: task_name(node),
        command: CommandInfo { value, uris },
    }
}

/// Reservation as task resources: positive scalars and one single-port
/// range per reserved port, all in the default role.
pub fn to_resources(reservation: &Reservation) -> Vec<Resource> {
    let mut resources = Vec::new();

    if reservation.cpus > 0.0 {
        resources.push(Resource::scalar(CPUS, reservation.cpus));
    }
    if reservation.mem > 0 {
        resources.push(Resource::scalar(MEM, reservation.mem as f64));
    }
    for port in reservation.ports.values() {
        resources.push(Resource {
            name: PORTS.to_string(),
            role: ANY_ROLE.to_string(),
            value: ResourceValue::Ranges(vec![Range::point(*port)]),
        });
    }

    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsgrid_state::{NodeType, Runtime};
    use std::collections::BTreeMap;

    fn launched() -> Node {
        let mut node = Node::new("dn0", NodeType::Datanode);
        node.executor_jvm_opts = Some("-Xmx100m".into());
        node.attach_runtime(
            Runtime {
                task_id: "task".into(),
                executor_id: "executor".into(),
                slave_id: "slave".into(),
                hostname: "host".into(),
                attributes: BTreeMap::new(),
                fs_uri: Some("hdfs://nn:1".into()),
                kill_sent: false,
            },
            Reservation {
                cpus: 0.5,
                mem: 512,
                ports: BTreeMap::from([
                    ("http".into(), 10),
                    ("ipc".into(), 11),
                    ("data".into(), 12),
                ]),
            },
        );
        node
    }

    fn settings() -> TaskSettings {
        TaskSettings {
            api: "http://sched:7000/".into(),
            jar: Some("fsgrid-executor-0.1.0".into()),
            hadoop: Some("hadoop-2.7.2.tar.gz".into()),
            executor_command: "./fsgrid-executor".into(),
        }
    }

    #[test]
    fn task_fields() {
        let node = launched();
        let task = new_task(&node, &settings()).unwrap();

        assert_eq!(task.task_id, "task");
        assert_eq!(task.name, "hdfs-dn0");
        assert_eq!(task.slave_id, "slave");
        assert_eq!(task.resources, to_resources(node.reservation().unwrap()));

        let record: NodeRecord = serde_json::from_slice(&task.data).unwrap();
        assert_eq!(record, NodeRecord::from(&node));
    }

    #[test]
    fn executor_fields() {
        let task = new_task(&launched(), &settings()).unwrap();
        let executor = task.executor;

        assert_eq!(executor.executor_id, "executor");
        assert_eq!(executor.name, "hdfs-dn0");
        assert_eq!(executor.command.value, "./fsgrid-executor -Xmx100m");
        assert_eq!(
            executor.command.uris,
            vec![
                CommandUri {
                    value: "http://sched:7000/jar/fsgrid-executor-0.1.0".into(),
                    extract: false,
                },
                CommandUri {
                    value: "http://sched:7000/hadoop/hadoop-2.7.2.tar.gz".into(),
                    extract: true,
                },
            ]
        );
    }

    #[test]
    fn resources_skip_zero_scalars() {
        let reservation = Reservation {
            cpus: 0.0,
            mem: 0,
            ports: BTreeMap::from([("http".into(), 5)]),
        };
        let resources = to_resources(&reservation);
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name, "ports");
        assert_eq!(resources[0].role, "*");
        assert_eq!(resources[0].value, ResourceValue::Ranges(vec![Range::point(5)]));
    }

    #[test]
    fn no_task_without_runtime() {
        let node = Node::new("nn", NodeType::Namenode);
        assert!(new_task(&node, &TaskSettings::default()).is_err());
    }
}
