//! Value types for logical cluster membership.

use serde::{Deserialize, Serialize};

use crate::error::{LogicalClusterError, Result};

/// Longest value the control plane accepts for a tag.
const MAX_NAME_LEN: usize = 63;

/// Point-in-time view of one logical cluster.
///
/// Built from a control plane query and never cached; it goes stale as soon
/// as node tags change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalCluster {
    /// Value of the membership tag
    pub cluster_name: String,
    /// Ids of the member nodes, in control plane order
    pub hosts: Vec<String>,
}

impl LogicalCluster {
    pub fn new(cluster_name: impl Into<String>, hosts: Vec<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            hosts,
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.hosts.iter().any(|h| h == node_id)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Direction of a scale operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleDirection {
    /// Tag the listed nodes into the cluster
    Expand,
    /// Remove the membership tag from the listed nodes
    Shrink,
}

impl std::fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expand => write!(f, "expand"),
            Self::Shrink => write!(f, "shrink"),
        }
    }
}

/// Check that `name` can be stored as a tag value.
///
/// Non-empty, at most 63 characters, alphanumerics plus `-`, `_` and `.`,
/// beginning and ending with an alphanumeric.
pub fn validate_cluster_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LogicalClusterError::InvalidArgument(
            "cluster name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(LogicalClusterError::InvalidArgument(format!(
            "cluster name '{}' exceeds {} characters",
            name, MAX_NAME_LEN
        )));
    }

    let bytes = name.as_bytes();
    let valid_chars = bytes
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    let valid_ends =
        bytes[0].is_ascii_alphanumeric() && bytes[bytes.len() - 1].is_ascii_alphanumeric();
    if !valid_chars || !valid_ends {
        return Err(LogicalClusterError::InvalidArgument(format!(
            "cluster name '{}' is not a valid tag value",
            name
        )));
    }
    Ok(())
}
