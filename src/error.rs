use thiserror::Error;

/// Failure reported by the control plane collaborator.
///
/// These are never retried or suppressed by the membership layer; they reach
/// the caller exactly as the inventory or patch client produced them.
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Injected failure: {0}")]
    Injected(String),
}

#[derive(Error, Debug)]
pub enum LogicalClusterError {
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error("Logical cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("No logical cluster exists")]
    NoClustersExist,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LogicalClusterError {
    /// True when the error came from the control plane rather than the
    /// membership layer itself.
    pub fn is_control_plane(&self) -> bool {
        matches!(self, Self::ControlPlane(_))
    }

    /// True for `ClusterNotFound` and `NoClustersExist`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ClusterNotFound(_) | Self::NoClustersExist)
    }
}

pub type Result<T> = std::result::Result<T, LogicalClusterError>;

pub type ControlPlaneResult<T> = std::result::Result<T, ControlPlaneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = LogicalClusterError::from(ControlPlaneError::NodeNotFound("n1".to_string()));
        assert!(err.is_control_plane());
        assert!(!err.is_not_found());

        assert!(LogicalClusterError::ClusterNotFound("mq".to_string()).is_not_found());
        assert!(LogicalClusterError::NoClustersExist.is_not_found());
        assert!(!LogicalClusterError::NoClustersExist.is_control_plane());
    }

    #[test]
    fn test_error_display() {
        let err = LogicalClusterError::ClusterNotFound("mq-cluster".to_string());
        assert_eq!(err.to_string(), "Logical cluster not found: mq-cluster");

        let err = ControlPlaneError::Status {
            status: 403,
            message: "forbidden".to_string(),
        };
        assert_eq!(err.to_string(), "API server returned 403: forbidden");
    }
}
