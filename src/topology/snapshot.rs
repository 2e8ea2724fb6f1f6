use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

use super::SnapshotError;

/// One response of the topology API, exactly as served.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub nodes: Option<Vec<RawNode>>,
    #[serde(default)]
    pub pods: Option<Vec<RawPod>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RawNode {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RawPod {
    pub name: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub ready: Option<bool>,
}

impl RawPod {
    /// Scheduled node, with empty strings treated as unscheduled.
    pub fn node_name(&self) -> Option<&str> {
        self.node.as_deref().filter(|node| !node.is_empty())
    }

    pub fn deployment_name(&self) -> Option<&str> {
        self.deployment.as_deref().filter(|name| !name.is_empty())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.unwrap_or(true)
    }
}

/// Unparseable bodies are transient (the next poll may succeed); bodies that
/// parse but have the wrong shape are malformed.
pub fn parse_snapshot(raw: &str) -> Result<RawSnapshot, SnapshotError> {
    let parsed: Value = serde_json::from_str(raw)
        .context("invalid JSON from topology API")
        .map_err(SnapshotError::TransientFetch)?;

    if !parsed.is_object() {
        return Err(SnapshotError::Malformed(
            "topology response is not a JSON object".to_owned(),
        ));
    }

    RawSnapshot::deserialize(parsed)
        .map_err(|error| SnapshotError::Malformed(format!("unexpected snapshot shape: {error}")))
}
