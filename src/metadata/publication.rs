//! Publisher publications as cached on the subscriber.
//!
//! The publisher is authoritative; the subscriber's copy is a read-through
//! cache refreshed wholesale whenever the cluster-state custom changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::relation::RelationName;

/// A named set of relations exposed for subscription on the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub owner: String,
    /// Publish every table the owner can see instead of an explicit list.
    pub for_all_tables: bool,
    #[serde(default)]
    pub relations: Vec<RelationName>,
}

impl Publication {
    pub fn new(owner: impl Into<String>, for_all_tables: bool, relations: Vec<RelationName>) -> Self {
        Self {
            owner: owner.into(),
            for_all_tables,
            relations,
        }
    }
}

/// Cluster-state custom holding every publication, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicationsMetadata {
    publications: BTreeMap<String, Publication>,
}

impl PublicationsMetadata {
    pub fn new(publications: BTreeMap<String, Publication>) -> Self {
        Self { publications }
    }

    pub fn publications(&self) -> &BTreeMap<String, Publication> {
        &self.publications
    }

    pub fn get(&self, name: &str) -> Option<&Publication> {
        self.publications.get(name)
    }

    pub fn with_publication(mut self, name: impl Into<String>, publication: Publication) -> Self {
        self.publications.insert(name.into(), publication);
        self
    }
}
