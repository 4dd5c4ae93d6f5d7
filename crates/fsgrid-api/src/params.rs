//! Query parameters of the node endpoints.
//!
//! Every parameter is optional on update; an empty string clears an
//! optional field.

use std::collections::{BTreeMap, HashMap};

use fsgrid_core::constraint::parse_constraints;
use fsgrid_core::strings::parse_map;
use fsgrid_core::{Constraint, Period};
use fsgrid_state::{Node, NodeType, StateError};

use crate::error::ApiError;

pub type Params = HashMap<String, String>;

pub const DEFAULT_TIMEOUT: Period = Period::new(2, fsgrid_core::period::TimeUnit::M);

/// The `node` id expression, which must be present and non-empty.
pub fn required_node(params: &Params) -> Result<&str, ApiError> {
    match params.get("node").map(String::as_str) {
        Some(expr) if !expr.trim().is_empty() => Ok(expr),
        _ => Err(ApiError::bad_request("node required")),
    }
}

pub fn node_type(params: &Params) -> Result<NodeType, ApiError> {
    params
        .get("type")
        .and_then(|t| NodeType::parse(t))
        .ok_or_else(|| ApiError::bad_request("invalid type"))
}

pub fn timeout(params: &Params) -> Result<Period, ApiError> {
    match params.get("timeout") {
        Some(t) => t
            .parse()
            .map_err(|_| ApiError::bad_request("invalid timeout")),
        None => Ok(DEFAULT_TIMEOUT),
    }
}

fn optional_text(params: &Params, name: &str) -> Option<Option<String>> {
    params
        .get(name)
        .map(|v| if v.is_empty() { None } else { Some(v.clone()) })
}

fn optional_map(params: &Params, name: &str) -> Result<Option<BTreeMap<String, String>>, ApiError> {
    params
        .get(name)
        .map(|v| parse_map(v))
        .transpose()
        .map_err(|_| ApiError::bad_request(format!("invalid {name}")))
}

/// Field changes requested by add/update.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NodeChanges {
    pub cpus: Option<f64>,
    pub mem: Option<u64>,
    pub constraints: Option<BTreeMap<String, Constraint>>,
    pub stickiness_period: Option<Period>,
    pub executor_jvm_opts: Option<Option<String>>,
    pub hadoop_jvm_opts: Option<Option<String>>,
    pub core_site_opts: Option<BTreeMap<String, String>>,
    pub hdfs_site_opts: Option<BTreeMap<String, String>>,
    pub external_fs_uri: Option<Option<String>>,
}

impl NodeChanges {
    pub fn parse(params: &Params) -> Result<Self, ApiError> {
        let cpus = params
            .get("cpus")
            .map(|v| match v.parse::<f64>() {
                Ok(cpus) if cpus.is_finite() && cpus >= 0.0 => Ok(cpus),
                _ => Err(ApiError::bad_request("invalid cpus")),
            })
            .transpose()?;

        let mem = params
            .get("mem")
            .map(|v| v.parse::<u64>().map_err(|_| ApiError::bad_request("invalid mem")))
            .transpose()?;

        let constraints = params
            .get("constraints")
            .map(|v| parse_constraints(v))
            .transpose()
            .map_err(|_| ApiError::bad_request("invalid constraints"))?;

        let stickiness_period = params
            .get("stickinessPeriod")
            .map(|v| v.parse::<Period>())
            .transpose()
            .map_err(|_| ApiError::bad_request("invalid stickinessPeriod"))?;

        Ok(Self {
            cpus,
            mem,
            constraints,
            stickiness_period,
            executor_jvm_opts: optional_text(params, "executorJvmOpts"),
            hadoop_jvm_opts: optional_text(params, "hadoopJvmOpts"),
            core_site_opts: optional_map(params, "coreSiteOpts")?,
            hdfs_site_opts: optional_map(params, "hdfsSiteOpts")?,
            external_fs_uri: optional_text(params, "externalFsUri"),
        })
    }

    pub fn apply(&self, node: &mut Node) -> Result<(), StateError> {
        if let Some(Some(_)) = &self.external_fs_uri {
            if node.node_type != NodeType::Namenode {
                return Err(StateError::Invalid(format!(
                    "externalFsUri is only supported for namenodes: {}",
                    node.id
                )));
            }
        }

        if let Some(cpus) = self.cpus {
            node.cpus = cpus;
        }
        if let Some(mem) = self.mem {
            node.mem = mem;
        }
        if let Some(constraints) = &self.constraints {
            node.constraints = constraints.clone();
        }
        if let Some(period) = self.stickiness_period {
            node.stickiness.period = period;
        }
        if let Some(opts) = &self.executor_jvm_opts {
            node.executor_jvm_opts = opts.clone();
        }
        if let Some(opts) = &self.hadoop_jvm_opts {
            node.hadoop_jvm_opts = opts.clone();
        }
        if let Some(opts) = &self.core_site_opts {
            node.core_site_opts = opts.clone();
        }
        if let Some(opts) = &self.hdfs_site_opts {
            node.hdfs_site_opts = opts.clone();
        }
        if let Some(uri) = &self.external_fs_uri {
            node.external_fs_uri = uri.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn error(result: Result<impl std::fmt::Debug, ApiError>) -> String {
        result.unwrap_err().message
    }

    #[test]
    fn node_is_required() {
        assert_eq!(error(required_node(&params(&[]))), "node required");
        assert_eq!(error(required_node(&params(&[("node", " ")]))), "node required");
        assert_eq!(required_node(&params(&[("node", "dn*")])).unwrap(), "dn*");
    }

    #[test]
    fn parses_type_and_timeout() {
        assert_eq!(node_type(&params(&[("type", "datanode")])).unwrap(), NodeType::Datanode);
        assert_eq!(error(node_type(&params(&[("type", "journal")]))), "invalid type");
        assert_eq!(error(node_type(&params(&[]))), "invalid type");

        assert_eq!(timeout(&params(&[])).unwrap(), DEFAULT_TIMEOUT);
        assert!(timeout(&params(&[("timeout", "0")])).unwrap().is_zero());
        assert_eq!(error(timeout(&params(&[("timeout", "soon")]))), "invalid timeout");
    }

    #[test]
    fn rejects_invalid_fields() {
        for (name, value, message) in [
            ("cpus", "x", "invalid cpus"),
            ("cpus", "-1", "invalid cpus"),
            ("mem", "1.5", "invalid mem"),
            ("constraints", "rack=bogus:1", "invalid constraints"),
            ("stickinessPeriod", "10", "invalid stickinessPeriod"),
            ("coreSiteOpts", "=1", "invalid coreSiteOpts"),
            ("hdfsSiteOpts", "a", "invalid hdfsSiteOpts"),
        ] {
            assert_eq!(error(NodeChanges::parse(&params(&[(name, value)]))), message, "{name}={value}");
        }
    }

    #[test]
    fn applies_and_clears_fields() {
        let mut node = Node::new("nn", NodeType::Namenode);
        node.hadoop_jvm_opts = Some("-Xmx1g".into());

        let changes = NodeChanges::parse(&params(&[
            ("cpus", "1.5"),
            ("mem", "2048"),
            ("constraints", "hostname=like:master.*"),
            ("stickinessPeriod", "30m"),
            ("executorJvmOpts", "-Xmx128m"),
            ("hadoopJvmOpts", ""),
            ("coreSiteOpts", "a=1,b=2"),
            ("externalFsUri", "hdfs://external:8020"),
        ]))
        .unwrap();
        changes.apply(&mut node).unwrap();

        assert_eq!(node.cpus, 1.5);
        assert_eq!(node.mem, 2048);
        assert_eq!(node.constraints.len(), 1);
        assert_eq!(node.stickiness.period, "30m".parse::<Period>().unwrap());
        assert_eq!(node.executor_jvm_opts.as_deref(), Some("-Xmx128m"));
        assert_eq!(node.hadoop_jvm_opts, None);
        assert_eq!(node.core_site_opts.get("b").map(String::as_str), Some("2"));
        assert!(node.hdfs_site_opts.is_empty());
        assert_eq!(node.external_fs_uri.as_deref(), Some("hdfs://external:8020"));
    }

    #[test]
    fn external_uri_only_for_namenodes() {
        let mut node = Node::new("dn0", NodeType::Datanode);
        let changes = NodeChanges::parse(&params(&[("externalFsUri", "hdfs://x:1")])).unwrap();
        assert!(changes.apply(&mut node).is_err());

        let clear = NodeChanges::parse(&params(&[("externalFsUri", "")])).unwrap();
        assert!(clear.apply(&mut node).is_ok());
    }
}
