//! Logical cluster membership.
//!
//! A logical cluster is nothing more than the set of nodes whose
//! [`CLUSTER_TAG_KEY`] tag carries its name. There is no stored cluster
//! object; every read goes back to the control plane through
//! [`MembershipManager::members_of`].
//!
//! # Multi-node mutations
//!
//! The control plane patches one node at a time. Every operation that touches
//! several nodes walks them in the order supplied and stops at the first
//! failure, without rolling back nodes already patched. After any error from
//! a mutating operation, some prefix of the node list may have been changed;
//! re-query before assuming a particular state.

mod types;

pub use types::{validate_cluster_name, LogicalCluster, ScaleDirection};

use tracing::{debug, info, warn};

use crate::control_plane::ControlPlane;
use crate::error::{LogicalClusterError, Result};

/// Tag key that carries logical cluster membership.
pub const CLUSTER_TAG_KEY: &str = "logical-cluster";

/// Create, inspect, rename, scale and delete logical clusters on top of a
/// control plane.
#[derive(Debug, Clone)]
pub struct MembershipManager<C> {
    control_plane: C,
}

impl<C: ControlPlane> MembershipManager<C> {
    pub fn new(control_plane: C) -> Self {
        Self { control_plane }
    }

    pub fn control_plane(&self) -> &C {
        &self.control_plane
    }

    /// Ids of the nodes currently tagged with `name`, in control plane order.
    ///
    /// A name that cannot be stored as a tag value has no members and is
    /// never sent to the control plane as a selector.
    pub async fn members_of(&self, name: &str) -> Result<Vec<String>> {
        if validate_cluster_name(name).is_err() {
            debug!(cluster = %name, "invalid cluster name has no members");
            return Ok(Vec::new());
        }
        let nodes = self
            .control_plane
            .list_by_tag_equals(CLUSTER_TAG_KEY, name)
            .await?;
        debug!(cluster = %name, members = nodes.len(), "resolved members");
        Ok(nodes.into_iter().map(|node| node.id).collect())
    }

    /// Tag every node in `node_ids` with `name`.
    ///
    /// A node already in another cluster moves to `name`. Tagging a node that
    /// is already a member is harmless.
    ///
    /// # Errors
    ///
    /// Stops at the first control plane failure. Nodes before the failing one
    /// stay tagged, the failing node and those after it are untouched.
    pub async fn create_cluster<S: AsRef<str>>(&self, name: &str, node_ids: &[S]) -> Result<()> {
        validate_cluster_name(name)?;
        self.tag_nodes(name, node_ids).await?;
        info!(cluster = %name, nodes = node_ids.len(), "logical cluster created");
        Ok(())
    }

    /// Current view of one cluster.
    ///
    /// # Errors
    ///
    /// `ClusterNotFound` when no node carries `name`.
    pub async fn get_cluster(&self, name: &str) -> Result<LogicalCluster> {
        let cluster = LogicalCluster::new(name, self.members_of(name).await?);
        if cluster.is_empty() {
            return Err(LogicalClusterError::ClusterNotFound(name.to_string()));
        }
        Ok(cluster)
    }

    /// Every cluster that currently has at least one member, in the order
    /// their names are first seen in the control plane's node listing.
    ///
    /// Members are collected from the single discovery query rather than
    /// re-querying each name.
    ///
    /// # Errors
    ///
    /// `NoClustersExist` when no node carries the membership tag.
    pub async fn list_clusters(&self) -> Result<Vec<LogicalCluster>> {
        let nodes = self.control_plane.list_by_tag_exists(CLUSTER_TAG_KEY).await?;
        if nodes.is_empty() {
            return Err(LogicalClusterError::NoClustersExist);
        }

        let mut clusters: Vec<LogicalCluster> = Vec::new();
        for node in nodes {
            let Some(name) = node.tags.get(CLUSTER_TAG_KEY) else {
                continue;
            };
            match clusters.iter_mut().find(|c| &c.cluster_name == name) {
                Some(cluster) => cluster.hosts.push(node.id),
                None => clusters.push(LogicalCluster::new(name.clone(), vec![node.id])),
            }
        }

        debug!(clusters = clusters.len(), "listed logical clusters");
        Ok(clusters)
    }

    /// Remove the membership tag from every current member of `name`.
    ///
    /// # Errors
    ///
    /// `ClusterNotFound` when the cluster has no members. Control plane
    /// failures stop the loop with the same prefix semantics as
    /// [`create_cluster`](Self::create_cluster).
    pub async fn delete_cluster(&self, name: &str) -> Result<()> {
        let cluster = self.get_cluster(name).await?;
        self.untag_nodes(&cluster.hosts).await?;
        info!(cluster = %name, nodes = cluster.hosts.len(), "logical cluster deleted");
        Ok(())
    }

    /// Tag `node_ids` with `new_name` and return the resulting view.
    ///
    /// Only the supplied nodes are re-tagged. Members of the old name that
    /// are not listed keep their old tag.
    pub async fn rename_cluster<S: AsRef<str>>(
        &self,
        new_name: &str,
        node_ids: &[S],
    ) -> Result<LogicalCluster> {
        validate_cluster_name(new_name)?;
        self.tag_nodes(new_name, node_ids).await?;
        info!(cluster = %new_name, nodes = node_ids.len(), "logical cluster renamed");
        self.get_cluster(new_name).await
    }

    /// Add `node_ids` to, or remove them from, `name` and return the
    /// resulting view.
    ///
    /// Shrinking removes the membership tag from the listed nodes whatever
    /// cluster they belong to. When a shrink removes the last member the
    /// returned result is `ClusterNotFound`.
    pub async fn scale_cluster<S: AsRef<str>>(
        &self,
        name: &str,
        node_ids: &[S],
        direction: ScaleDirection,
    ) -> Result<LogicalCluster> {
        validate_cluster_name(name)?;
        match direction {
            ScaleDirection::Expand => self.tag_nodes(name, node_ids).await?,
            ScaleDirection::Shrink => self.untag_nodes(node_ids).await?,
        }
        info!(cluster = %name, nodes = node_ids.len(), direction = %direction, "logical cluster scaled");
        self.get_cluster(name).await
    }

    async fn tag_nodes<S: AsRef<str>>(&self, name: &str, node_ids: &[S]) -> Result<()> {
        for (patched, node_id) in node_ids.iter().enumerate() {
            let node_id = node_id.as_ref();
            if let Err(e) = self
                .control_plane
                .set_tag(node_id, CLUSTER_TAG_KEY, name)
                .await
            {
                warn!(cluster = %name, node = %node_id, patched, error = %e, "tagging aborted");
                return Err(e.into());
            }
            debug!(cluster = %name, node = %node_id, "node tagged");
        }
        Ok(())
    }

    async fn untag_nodes<S: AsRef<str>>(&self, node_ids: &[S]) -> Result<()> {
        for (patched, node_id) in node_ids.iter().enumerate() {
            let node_id = node_id.as_ref();
            if let Err(e) = self
                .control_plane
                .remove_tag(node_id, CLUSTER_TAG_KEY)
                .await
            {
                warn!(node = %node_id, patched, error = %e, "untagging aborted");
                return Err(e.into());
            }
            debug!(node = %node_id, "node untagged");
        }
        Ok(())
    }
}
