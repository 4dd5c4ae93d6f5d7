//! redb table definitions for the registry store.
//!
//! Both tables use `&str` keys and `&[u8]` values (JSON).

use redb::TableDefinition;

/// One schema node record per node, keyed by node id.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Registry-level values, keyed by [`META_VERSION`], [`META_FRAMEWORK_ID`]
/// and [`META_ORDER`].
pub const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

pub const META_VERSION: &str = "version";
pub const META_FRAMEWORK_ID: &str = "frameworkId";
/// JSON array of node ids in registry order.
pub const META_ORDER: &str = "order";
