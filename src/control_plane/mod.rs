//! Control plane collaborators.
//!
//! The membership layer never talks to the API server directly. It consumes
//! two narrow traits:
//!
//! - [`NodeInventory`]: read-only node queries, filtered by a [`TagSelector`]
//! - [`TagPatcher`]: one [`TagPatch`] applied to one node per call
//!
//! Two implementations are provided: [`KubeControlPlane`] talks to a
//! Kubernetes-compatible API server over HTTP, [`MemoryControlPlane`] keeps
//! nodes in process and is used by tests and dry runs.

pub mod kube;
pub mod memory;

pub use kube::KubeControlPlane;
pub use memory::{ControlPlaneCall, MemoryControlPlane};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ControlPlaneResult;

/// A machine as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Identifier assigned by the control plane (the node name)
    pub id: String,
    /// Full tag map of the node
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Tag predicate used to filter inventory queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSelector {
    /// Node carries the key, whatever the value
    Exists(String),
    /// Node carries the key with exactly this value
    Equals(String, String),
}

impl TagSelector {
    pub fn exists(key: impl Into<String>) -> Self {
        Self::Exists(key.into())
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals(key.into(), value.into())
    }

    /// Evaluate the predicate against a tag map.
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Exists(key) => tags.contains_key(key),
            Self::Equals(key, value) => tags.get(key) == Some(value),
        }
    }
}

impl std::fmt::Display for TagSelector {
    /// Kubernetes label selector syntax.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exists(key) => write!(f, "{}", key),
            Self::Equals(key, value) => write!(f, "{}={}", key, value),
        }
    }
}

/// A single tag mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagPatch {
    /// Create the tag, or overwrite its current value
    Set { key: String, value: String },
    /// Delete the tag; a node without the tag is left unchanged
    Remove { key: String },
}

impl TagPatch {
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Remove { key } => key,
        }
    }

    /// Apply the patch to a tag map in place.
    pub fn apply_to(&self, tags: &mut BTreeMap<String, String>) {
        match self {
            Self::Set { key, value } => {
                tags.insert(key.clone(), value.clone());
            }
            Self::Remove { key } => {
                tags.remove(key);
            }
        }
    }
}

/// Read-only node queries.
#[async_trait]
pub trait NodeInventory: Send + Sync {
    /// List nodes, optionally filtered by a tag predicate. Order is the
    /// control plane's.
    async fn list(&self, selector: Option<&TagSelector>) -> ControlPlaneResult<Vec<Node>>;

    /// Fetch the tag map of one node.
    async fn node_tags(&self, node_id: &str) -> ControlPlaneResult<BTreeMap<String, String>>;

    async fn list_all(&self) -> ControlPlaneResult<Vec<Node>> {
        self.list(None).await
    }

    async fn list_by_tag_equals(&self, key: &str, value: &str) -> ControlPlaneResult<Vec<Node>> {
        self.list(Some(&TagSelector::equals(key, value))).await
    }

    async fn list_by_tag_exists(&self, key: &str) -> ControlPlaneResult<Vec<Node>> {
        self.list(Some(&TagSelector::exists(key))).await
    }
}

/// Single-node tag mutation.
#[async_trait]
pub trait TagPatcher: Send + Sync {
    async fn apply(&self, node_id: &str, patch: &TagPatch) -> ControlPlaneResult<()>;

    async fn set_tag(&self, node_id: &str, key: &str, value: &str) -> ControlPlaneResult<()> {
        let patch = TagPatch::Set {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.apply(node_id, &patch).await
    }

    /// Removing a tag the node does not carry succeeds.
    async fn remove_tag(&self, node_id: &str, key: &str) -> ControlPlaneResult<()> {
        let patch = TagPatch::Remove {
            key: key.to_string(),
        };
        self.apply(node_id, &patch).await
    }
}

/// Everything the membership layer needs from a control plane.
pub trait ControlPlane: NodeInventory + TagPatcher {}

impl<T: NodeInventory + TagPatcher> ControlPlane for T {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(
            TagSelector::exists("logical-cluster").to_string(),
            "logical-cluster"
        );
        assert_eq!(
            TagSelector::equals("logical-cluster", "mq").to_string(),
            "logical-cluster=mq"
        );
    }

    #[test]
    fn test_selector_matches() {
        let node_tags = tags(&[("logical-cluster", "mq"), ("zone", "a")]);
        assert!(TagSelector::exists("zone").matches(&node_tags));
        assert!(TagSelector::equals("logical-cluster", "mq").matches(&node_tags));
        assert!(!TagSelector::equals("logical-cluster", "redis").matches(&node_tags));
        assert!(!TagSelector::exists("rack").matches(&node_tags));
    }

    #[test]
    fn test_patch_apply_to() {
        let mut node_tags = tags(&[("logical-cluster", "mq")]);

        TagPatch::Set {
            key: "logical-cluster".to_string(),
            value: "redis".to_string(),
        }
        .apply_to(&mut node_tags);
        assert_eq!(node_tags.get("logical-cluster").unwrap(), "redis");

        let remove = TagPatch::Remove {
            key: "logical-cluster".to_string(),
        };
        remove.apply_to(&mut node_tags);
        assert!(node_tags.is_empty());

        // Removing again is harmless
        remove.apply_to(&mut node_tags);
        assert!(node_tags.is_empty());
        assert_eq!(remove.key(), "logical-cluster");
    }
}
