//! In-process control plane for tests and dry runs.
//!
//! Nodes keep their registration order, which is the order every list query
//! reports them in. Every call is appended to a journal so callers can assert
//! on the exact sequence of queries and patches that reached the control
//! plane, and patch failures can be injected per node.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{Node, NodeInventory, TagPatch, TagPatcher, TagSelector};
use crate::error::{ControlPlaneError, ControlPlaneResult};

/// One call received by a [`MemoryControlPlane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    List(Option<TagSelector>),
    NodeTags(String),
    Patch(String, TagPatch),
}

#[derive(Debug, Default)]
pub struct MemoryControlPlane {
    nodes: RwLock<Vec<Node>>,
    failing_nodes: RwLock<HashSet<String>>,
    journal: Mutex<Vec<ControlPlaneCall>>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a control plane holding untagged nodes with the given ids.
    pub fn with_nodes<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let plane = Self::new();
        for id in ids {
            plane.insert_node(Node::new(id));
        }
        plane
    }

    /// Register a node, replacing any node with the same id in place.
    pub fn insert_node(&self, node: Node) {
        let mut nodes = self.nodes.write();
        match nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node,
            None => nodes.push(node),
        }
    }

    /// Make every patch against `node_id` fail until cleared.
    pub fn fail_patches_on(&self, node_id: impl Into<String>) {
        self.failing_nodes.write().insert(node_id.into());
    }

    pub fn clear_failures(&self) {
        self.failing_nodes.write().clear();
    }

    /// Current state of a node, read without touching the journal.
    pub fn node(&self, node_id: &str) -> Option<Node> {
        self.nodes.read().iter().find(|n| n.id == node_id).cloned()
    }

    pub fn journal(&self) -> Vec<ControlPlaneCall> {
        self.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    /// Node ids that received a patch, in call order.
    pub fn patched_nodes(&self) -> Vec<String> {
        self.journal
            .lock()
            .iter()
            .filter_map(|call| match call {
                ControlPlaneCall::Patch(id, _) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ControlPlaneCall) {
        self.journal.lock().push(call);
    }
}

#[async_trait]
impl NodeInventory for MemoryControlPlane {
    async fn list(&self, selector: Option<&TagSelector>) -> ControlPlaneResult<Vec<Node>> {
        self.record(ControlPlaneCall::List(selector.cloned()));

        let nodes = self.nodes.read();
        Ok(nodes
            .iter()
            .filter(|node| selector.map_or(true, |s| s.matches(&node.tags)))
            .cloned()
            .collect())
    }

    async fn node_tags(&self, node_id: &str) -> ControlPlaneResult<BTreeMap<String, String>> {
        self.record(ControlPlaneCall::NodeTags(node_id.to_string()));

        self.node(node_id)
            .map(|node| node.tags)
            .ok_or_else(|| ControlPlaneError::NodeNotFound(node_id.to_string()))
    }
}

#[async_trait]
impl TagPatcher for MemoryControlPlane {
    async fn apply(&self, node_id: &str, patch: &TagPatch) -> ControlPlaneResult<()> {
        self.record(ControlPlaneCall::Patch(node_id.to_string(), patch.clone()));

        if self.failing_nodes.read().contains(node_id) {
            return Err(ControlPlaneError::Injected(format!(
                "patch rejected for node {}",
                node_id
            )));
        }

        let mut nodes = self.nodes.write();
        let node = nodes
            .iter_mut()
            .find(|n| n.id == node_id)
            .ok_or_else(|| ControlPlaneError::NodeNotFound(node_id.to_string()))?;
        patch.apply_to(&mut node.tags);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_preserves_registration_order() {
        let plane = MemoryControlPlane::with_nodes(["n3", "n1", "n2"]);
        let ids: Vec<String> = plane
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["n3", "n1", "n2"]);
    }

    #[tokio::test]
    async fn test_tag_queries() {
        let plane = MemoryControlPlane::new();
        plane.insert_node(Node::new("n1").with_tag("logical-cluster", "mq"));
        plane.insert_node(Node::new("n2"));
        plane.insert_node(Node::new("n3").with_tag("logical-cluster", "redis"));

        let tagged = plane.list_by_tag_exists("logical-cluster").await.unwrap();
        assert_eq!(tagged.len(), 2);

        let mq = plane
            .list_by_tag_equals("logical-cluster", "mq")
            .await
            .unwrap();
        assert_eq!(mq.len(), 1);
        assert_eq!(mq[0].id, "n1");

        let none = plane
            .list_by_tag_equals("logical-cluster", "kafka")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_set_and_remove_tag() {
        let plane = MemoryControlPlane::with_nodes(["n1"]);

        plane.set_tag("n1", "logical-cluster", "mq").await.unwrap();
        plane.set_tag("n1", "logical-cluster", "mq").await.unwrap();
        let tags = plane.node_tags("n1").await.unwrap();
        assert_eq!(tags.get("logical-cluster").map(String::as_str), Some("mq"));

        plane.remove_tag("n1", "logical-cluster").await.unwrap();
        // Absent key is a no-op
        plane.remove_tag("n1", "logical-cluster").await.unwrap();
        assert!(plane.node_tags("n1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_node() {
        let plane = MemoryControlPlane::new();
        let err = plane.set_tag("ghost", "k", "v").await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::NodeNotFound(id) if id == "ghost"));

        let err = plane.node_tags("ghost").await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failure_and_journal() {
        let plane = MemoryControlPlane::with_nodes(["n1", "n2"]);
        plane.fail_patches_on("n2");

        plane.set_tag("n1", "k", "v").await.unwrap();
        let err = plane.set_tag("n2", "k", "v").await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Injected(_)));
        assert!(plane.node("n2").unwrap().tags.is_empty());
        assert_eq!(plane.patched_nodes(), vec!["n1", "n2"]);

        plane.clear_failures();
        plane.clear_journal();
        plane.set_tag("n2", "k", "v").await.unwrap();
        assert_eq!(plane.node("n2").unwrap().tag("k"), Some("v"));
        assert_eq!(plane.journal().len(), 1);
    }
}
