//! Publisher-side publication state lookup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::metadata::RelationName;

/// Ask the publisher which relations the given publications currently expose
/// to `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationsStateRequest {
    pub publications: Vec<String>,
    pub user: String,
}

/// One column of a relation schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

/// Schema descriptor sufficient to create the relation locally.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationSchema {
    pub columns: Vec<ColumnSchema>,
    /// Column names the relation is partitioned by; empty for regular tables.
    #[serde(default)]
    pub partitioned_by: Vec<String>,
}

/// A relation exposed by the publications, with its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub name: RelationName,
    pub schema: RelationSchema,
}

/// The publisher's answer: physical names to restore plus logical relations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicationsStateResponse {
    /// Physical index names, including one per partition.
    pub concrete_indices: Vec<String>,
    /// Partitioned-table template names.
    pub concrete_templates: Vec<String>,
    pub relations: Vec<RelationDescriptor>,
}

impl PublicationsStateResponse {
    pub fn relation_names(&self) -> BTreeSet<RelationName> {
        self.relations
            .iter()
            .map(|descriptor| descriptor.name.clone())
            .collect()
    }

    /// Concrete indices belonging to the given relations.
    pub fn indices_for(&self, relations: &BTreeSet<RelationName>) -> Vec<String> {
        self.concrete_indices
            .iter()
            .filter(|index| relations.contains(&RelationName::from_index_name(index.as_str())))
            .cloned()
            .collect()
    }

    /// Concrete templates belonging to the given relations.
    pub fn templates_for(&self, relations: &BTreeSet<RelationName>) -> Vec<String> {
        self.concrete_templates
            .iter()
            .filter(|template| {
                RelationName::from_template_name(template.as_str())
                    .is_some_and(|relation| relations.contains(&relation))
            })
            .cloned()
            .collect()
    }
}
