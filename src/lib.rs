pub mod config;
pub mod control_plane;
pub mod error;
pub mod membership;

pub use config::Config;
pub use control_plane::{KubeControlPlane, MemoryControlPlane, Node, NodeInventory, TagPatcher};
pub use error::{ControlPlaneError, LogicalClusterError, Result};
pub use membership::{LogicalCluster, MembershipManager, ScaleDirection, CLUSTER_TAG_KEY};
