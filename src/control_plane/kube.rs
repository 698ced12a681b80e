//! HTTP client for a Kubernetes-compatible API server.
//!
//! Tags are node labels. Queries go through `GET /api/v1/nodes` with a
//! `labelSelector`, mutations through `PATCH /api/v1/nodes/{name}` with a
//! merge body on `metadata.labels`. A `null` label value deletes the label
//! and leaves a node without it untouched, so both patch kinds share one
//! wire shape.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{Node, NodeInventory, TagPatch, TagPatcher, TagSelector};
use crate::config::ControlPlaneConfig;
use crate::error::{ControlPlaneError, ControlPlaneResult, Result};

const NODES_PATH: &str = "/api/v1/nodes";
const MERGE_PATCH_CONTENT_TYPE: &str = "application/strategic-merge-patch+json";

#[derive(Debug, Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<NodeObject>,
}

#[derive(Debug, Deserialize)]
struct NodeObject {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

impl From<NodeObject> for Node {
    fn from(object: NodeObject) -> Self {
        Node {
            id: object.metadata.name,
            tags: object.metadata.labels.unwrap_or_default(),
        }
    }
}

/// Kubernetes `Status` body returned with error responses.
#[derive(Debug, Deserialize)]
struct StatusBody {
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KubeControlPlane {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl KubeControlPlane {
    pub fn new(config: &ControlPlaneConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(ControlPlaneError::Http)?;

        Ok(Self {
            client,
            base_url: config.api_server.trim_end_matches('/').to_owned(),
            token: config.bearer_token()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn node_url(&self, node_id: &str) -> String {
        format!("{}{}/{}", self.base_url, NODES_PATH, node_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Turn a non-success response into a `ControlPlaneError`.
    async fn check(response: Response, node_id: Option<&str>) -> ControlPlaneResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = node_id {
                return Err(ControlPlaneError::NodeNotFound(id.to_string()));
            }
        }
        let body = response.text().await.unwrap_or_default();
        Err(ControlPlaneError::Status {
            status: status.as_u16(),
            message: status_message(&body),
        })
    }
}

/// Extract the `message` of a Kubernetes `Status` body, falling back to the
/// raw text.
fn status_message(body: &str) -> String {
    serde_json::from_str::<StatusBody>(body)
        .ok()
        .and_then(|status| status.message)
        .unwrap_or_else(|| body.to_string())
}

/// Request body for a label patch.
fn patch_body(patch: &TagPatch) -> Value {
    let value = match patch {
        TagPatch::Set { value, .. } => Value::String(value.clone()),
        TagPatch::Remove { .. } => Value::Null,
    };
    json!({ "metadata": { "labels": { patch.key(): value } } })
}

fn decode_node_list(body: &[u8]) -> ControlPlaneResult<Vec<Node>> {
    let list: NodeList = serde_json::from_slice(body)?;
    Ok(list.items.into_iter().map(Node::from).collect())
}

fn decode_node(body: &[u8]) -> ControlPlaneResult<Node> {
    let object: NodeObject = serde_json::from_slice(body)?;
    Ok(object.into())
}

#[async_trait]
impl NodeInventory for KubeControlPlane {
    async fn list(&self, selector: Option<&TagSelector>) -> ControlPlaneResult<Vec<Node>> {
        let url = format!("{}{}", self.base_url, NODES_PATH);
        let mut request = self.client.get(&url);
        if let Some(selector) = selector {
            request = request.query(&[("labelSelector", selector.to_string())]);
        }
        debug!(url = %url, selector = ?selector.map(ToString::to_string), "listing nodes");

        let response = self.authorize(request).send().await?;
        let response = Self::check(response, None).await?;
        decode_node_list(&response.bytes().await?)
    }

    async fn node_tags(&self, node_id: &str) -> ControlPlaneResult<BTreeMap<String, String>> {
        let request = self.client.get(self.node_url(node_id));
        let response = self.authorize(request).send().await?;
        let response = Self::check(response, Some(node_id)).await?;
        Ok(decode_node(&response.bytes().await?)?.tags)
    }
}

#[async_trait]
impl TagPatcher for KubeControlPlane {
    async fn apply(&self, node_id: &str, patch: &TagPatch) -> ControlPlaneResult<()> {
        let body = patch_body(patch);
        debug!(node = %node_id, body = %body, "patching node labels");

        let request = self
            .client
            .patch(self.node_url(node_id))
            .header(header::CONTENT_TYPE, MERGE_PATCH_CONTENT_TYPE)
            .body(body.to_string());
        let response = self.authorize(request).send().await?;
        Self::check(response, Some(node_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_body_set() {
        let patch = TagPatch::Set {
            key: "logical-cluster".to_string(),
            value: "mq-cluster".to_string(),
        };
        assert_eq!(
            patch_body(&patch),
            json!({"metadata": {"labels": {"logical-cluster": "mq-cluster"}}})
        );
    }

    #[test]
    fn test_patch_body_remove() {
        let patch = TagPatch::Remove {
            key: "logical-cluster".to_string(),
        };
        assert_eq!(
            patch_body(&patch),
            json!({"metadata": {"labels": {"logical-cluster": null}}})
        );
    }

    #[test]
    fn test_decode_node_list() {
        let body = br#"{
            "kind": "NodeList",
            "apiVersion": "v1",
            "items": [
                {"metadata": {"name": "node-a", "labels": {"logical-cluster": "mq", "zone": "a"}}},
                {"metadata": {"name": "node-b"}},
                {"metadata": {"name": "node-c", "labels": null}}
            ]
        }"#;
        let nodes = decode_node_list(body).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].id, "node-a");
        assert_eq!(nodes[0].tag("logical-cluster"), Some("mq"));
        assert!(nodes[1].tags.is_empty());
        assert!(nodes[2].tags.is_empty());
    }

    #[test]
    fn test_decode_empty_list() {
        let nodes = decode_node_list(br#"{"kind": "NodeList", "items": []}"#).unwrap();
        assert!(nodes.is_empty());
        let nodes = decode_node_list(br#"{"kind": "NodeList"}"#).unwrap();
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_decode_malformed() {
        let err = decode_node_list(b"not json").unwrap_err();
        assert!(matches!(err, ControlPlaneError::Decode(_)));
    }

    #[test]
    fn test_status_message() {
        let body = r#"{"kind":"Status","status":"Failure","message":"nodes is forbidden","code":403}"#;
        assert_eq!(status_message(body), "nodes is forbidden");
        assert_eq!(status_message("plain failure"), "plain failure");
    }

    #[test]
    fn test_client_from_config() {
        let config = ControlPlaneConfig {
            api_server: "https://10.0.0.1:6443/".to_string(),
            token: Some("abc".to_string()),
            ..Default::default()
        };
        let plane = KubeControlPlane::new(&config).unwrap();
        assert_eq!(plane.base_url(), "https://10.0.0.1:6443");
        assert_eq!(
            plane.node_url("node-a"),
            "https://10.0.0.1:6443/api/v1/nodes/node-a"
        );
    }
}
