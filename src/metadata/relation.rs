//! Relation names and their physical index/template forms.
//!
//! A relation is addressed as `schema.table`. Regular tables map to a single
//! concrete index of the same name. Partitioned tables are materialized as
//! one concrete index per partition plus a template that owns the common
//! schema; the template is named `<schema>..partitioned.<table>.` and each
//! partition index appends an opaque partition ident to that prefix.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const PARTITION_INFIX: &str = "..partitioned.";
const DEFAULT_SCHEMA: &str = "doc";

/// Fully qualified relation name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationName {
    schema: String,
    table: String,
}

impl RelationName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Resolve the logical relation behind a concrete index name, regular or
    /// partition.
    pub fn from_index_name(index: &str) -> Self {
        if let Some((schema, rest)) = index.split_once(PARTITION_INFIX) {
            let table = rest.split('.').next().unwrap_or(rest);
            return Self::new(schema, table);
        }
        match index.split_once('.') {
            Some((schema, table)) => Self::new(schema, table),
            None => Self::new(DEFAULT_SCHEMA, index),
        }
    }

    /// Translate a partitioned-table template name back to the logical
    /// relation, if the name follows the template convention.
    pub fn from_template_name(template: &str) -> Option<Self> {
        let (schema, rest) = template.split_once(PARTITION_INFIX)?;
        let table = rest.strip_suffix('.')?;
        if schema.is_empty() || table.is_empty() || table.contains('.') {
            return None;
        }
        Some(Self::new(schema, table))
    }

    /// Concrete index name of a regular (non-partitioned) relation.
    pub fn index_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Template name owning all partitions of this relation.
    pub fn template_name(&self) -> String {
        format!("{}{}{}.", self.schema, PARTITION_INFIX, self.table)
    }

    fn parse_fqn(s: &str) -> Self {
        match s.split_once('.') {
            Some((schema, table)) => Self::new(schema, table),
            None => Self::new(DEFAULT_SCHEMA, s),
        }
    }
}

// Display and the serde representation are both the `schema.table` form so
// the cluster-state blob stays readable.
impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

impl FromStr for RelationName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_fqn(s))
    }
}

impl Serialize for RelationName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RelationName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_fqn(&raw))
    }
}
