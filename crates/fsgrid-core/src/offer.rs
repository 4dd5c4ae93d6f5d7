//! Cluster-manager offer value types.
//!
//! These mirror the subset of the cluster manager's protocol the
//! scheduler looks at. Wire encoding lives in the client crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::range::Range;

pub const CPUS: &str = "cpus";
pub const MEM: &str = "mem";
pub const PORTS: &str = "ports";

/// Default resource role.
pub const ANY_ROLE: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceValue {
    Scalar(f64),
    Ranges(Vec<Range>),
    Set(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub role: String,
    pub value: ResourceValue,
}

impl Resource {
    pub fn scalar(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            role: ANY_ROLE.to_string(),
            value: ResourceValue::Scalar(value),
        }
    }

    pub fn ranges(name: &str, ranges: Vec<Range>) -> Self {
        Self {
            name: name.to_string(),
            role: ANY_ROLE.to_string(),
            value: ResourceValue::Ranges(ranges),
        }
    }
}

/// Offer attribute, with its value already rendered to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub framework_id: String,
    pub slave_id: String,
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Offer {
    /// Sum of all scalar resources called `name`, across roles.
    /// `None` when the offer carries no such resource.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        sum_scalars(self.resources.iter().filter(|r| r.name == name))
    }

    /// Like [`Offer::scalar`], limited to resources of `role`.
    pub fn scalar_in(&self, name: &str, role: &str) -> Option<f64> {
        sum_scalars(self.resources.iter().filter(|r| r.name == name && r.role == role))
    }

    /// All ranges of the resources called `name`, in offer order.
    pub fn ranges(&self, name: &str) -> Vec<Range> {
        collect_ranges(self.resources.iter().filter(|r| r.name == name))
    }

    /// Like [`Offer::ranges`], limited to resources of `role`.
    pub fn ranges_in(&self, name: &str, role: &str) -> Vec<Range> {
        collect_ranges(self.resources.iter().filter(|r| r.name == name && r.role == role))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Attributes as a map, including the synthetic `hostname`.
    pub fn attribute_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect();
        map.insert("hostname".to_string(), self.hostname.clone());
        map
    }
}

fn sum_scalars<'a>(resources: impl Iterator<Item = &'a Resource>) -> Option<f64> {
    resources
        .filter_map(|r| match r.value {
            ResourceValue::Scalar(v) => Some(v),
            _ => None,
        })
        .reduce(|a, b| a + b)
}

fn collect_ranges<'a>(resources: impl Iterator<Item = &'a Resource>) -> Vec<Range> {
    resources
        .flat_map(|r| match &r.value {
            ResourceValue::Ranges(ranges) => ranges.clone(),
            _ => Vec::new(),
        })
        .collect()
}

/// Parse a compact resource list: `cpus:0.5; mem:128; ports(hdfs):1000..2000,3000`.
///
/// `cpus`, `mem` and `disk` are scalars, `ports` is a range list. An
/// optional `(role)` follows the name; the default role is `*`.
pub fn parse_resources(s: &str) -> Result<Vec<Resource>, CoreError> {
    let invalid = |r: &str| CoreError::InvalidMap(format!("invalid resource: {r}"));
    let mut resources = Vec::new();

    for r in s.split(';').map(str::trim).filter(|r| !r.is_empty()) {
        let (key, value) = r.rsplit_once(':').ok_or_else(|| invalid(r))?;

        let (name, role) = match key.split_once('(') {
            Some((name, rest)) => {
                let role = rest.strip_suffix(')').ok_or_else(|| invalid(r))?;
                let role = role.split(',').next().unwrap_or(ANY_ROLE);
                (name.trim(), role.trim())
            }
            None => (key.trim(), ANY_ROLE),
        };

        let value = match name {
            CPUS | MEM | "disk" => ResourceValue::Scalar(value.trim().parse().map_err(|_| invalid(r))?),
            PORTS => ResourceValue::Ranges(parse_ranges(value)?),
            _ => return Err(invalid(r)),
        };

        resources.push(Resource {
            name: name.to_string(),
            role: role.to_string(),
            value,
        });
    }

    Ok(resources)
}

/// Parse `1000..1100,1102,2000..3000`.
pub fn parse_ranges(s: &str) -> Result<Vec<Range>, CoreError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(',').map(str::parse).collect()
}
