use std::collections::HashSet;

use super::{RawSnapshot, SnapshotError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Node,
    Pod,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterNode {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadUnit {
    pub id: String,
    pub parent: Option<String>,
    pub group: Option<String>,
    pub ready: bool,
}

impl WorkloadUnit {
    /// Unscheduled or not-ready pods render in the alarm color.
    pub fn is_alarm(&self) -> bool {
        self.parent.is_none() || !self.ready
    }
}

/// Link from a cluster node (`source`) to a pod scheduled on it (`target`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// Typed view of one accepted snapshot. Nodes and units are sorted by id so
/// that two snapshots listing the same entities in different orders produce
/// identical models.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopologyModel {
    pub nodes: Vec<ClusterNode>,
    pub units: Vec<WorkloadUnit>,
    pub edges: Vec<Edge>,
}

impl TopologyModel {
    pub fn build(snapshot: &RawSnapshot) -> Result<Self, SnapshotError> {
        let raw_nodes = snapshot
            .nodes
            .as_ref()
            .ok_or_else(|| SnapshotError::Malformed("snapshot has no `nodes` list".to_owned()))?;
        let raw_pods = snapshot
            .pods
            .as_ref()
            .ok_or_else(|| SnapshotError::Malformed("snapshot has no `pods` list".to_owned()))?;

        let mut seen = HashSet::with_capacity(raw_nodes.len() + raw_pods.len());
        let mut node_ids = HashSet::with_capacity(raw_nodes.len());

        let mut nodes = Vec::with_capacity(raw_nodes.len());
        for raw in raw_nodes {
            claim_id(&mut seen, &raw.name)?;
            node_ids.insert(raw.name.as_str());
            nodes.push(ClusterNode {
                id: raw.name.clone(),
            });
        }

        let mut units = Vec::with_capacity(raw_pods.len());
        for raw in raw_pods {
            claim_id(&mut seen, &raw.name)?;

            let parent = raw.node_name();
            if let Some(parent) = parent
                && !node_ids.contains(parent)
            {
                return Err(SnapshotError::Malformed(format!(
                    "pod `{}` is scheduled on unknown node `{parent}`",
                    raw.name
                )));
            }

            units.push(WorkloadUnit {
                id: raw.name.clone(),
                parent: parent.map(str::to_owned),
                group: raw.deployment_name().map(str::to_owned),
                ready: raw.is_ready(),
            });
        }

        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        units.sort_by(|a, b| a.id.cmp(&b.id));

        let edges = units
            .iter()
            .filter_map(|unit| {
                unit.parent.as_ref().map(|parent| Edge {
                    source: parent.clone(),
                    target: unit.id.clone(),
                })
            })
            .collect();

        Ok(Self {
            nodes,
            units,
            edges,
        })
    }

    pub fn entity_count(&self) -> usize {
        self.nodes.len() + self.units.len()
    }
}

fn claim_id<'a>(seen: &mut HashSet<&'a str>, id: &'a str) -> Result<(), SnapshotError> {
    if id.is_empty() {
        return Err(SnapshotError::Malformed("entity with an empty name".to_owned()));
    }
    if !seen.insert(id) {
        return Err(SnapshotError::Malformed(format!("duplicate entity id `{id}`")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{RawNode, RawPod};

    fn pod(name: &str, node: Option<&str>, deployment: Option<&str>, ready: bool) -> RawPod {
        RawPod {
            name: name.to_owned(),
            node: node.map(str::to_owned),
            deployment: deployment.map(str::to_owned),
            ready: Some(ready),
        }
    }

    fn snapshot(nodes: &[&str], pods: Vec<RawPod>) -> RawSnapshot {
        RawSnapshot {
            nodes: Some(
                nodes
                    .iter()
                    .map(|name| RawNode {
                        name: (*name).to_owned(),
                    })
                    .collect(),
            ),
            pods: Some(pods),
        }
    }

    #[test]
    fn builds_single_edge_for_scheduled_pod() {
        let model = TopologyModel::build(&snapshot(
            &["n1"],
            vec![pod("p1", Some("n1"), Some("d1"), true)],
        ))
        .expect("valid snapshot");

        assert_eq!(model.nodes.len(), 1);
        assert_eq!(model.units.len(), 1);
        assert_eq!(
            model.edges,
            vec![Edge {
                source: "n1".to_owned(),
                target: "p1".to_owned(),
            }]
        );
        assert!(!model.units[0].is_alarm());
    }

    #[test]
    fn unscheduled_and_unready_pods_are_alarms_without_edges() {
        let model = TopologyModel::build(&snapshot(
            &["n1"],
            vec![
                pod("pending", None, Some("d1"), false),
                pod("sick", Some("n1"), Some("d1"), false),
            ],
        ))
        .expect("valid snapshot");

        assert_eq!(model.edges.len(), 1);
        assert!(model.units.iter().all(WorkloadUnit::is_alarm));
    }

    #[test]
    fn missing_lists_are_malformed() {
        let missing_pods = RawSnapshot {
            nodes: Some(Vec::new()),
            pods: None,
        };
        assert!(matches!(
            TopologyModel::build(&missing_pods),
            Err(SnapshotError::Malformed(_))
        ));
        assert!(matches!(
            TopologyModel::build(&RawSnapshot::default()),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn duplicate_ids_are_malformed_across_kinds() {
        let clash = snapshot(&["shared"], vec![pod("shared", None, None, true)]);
        assert!(matches!(
            TopologyModel::build(&clash),
            Err(SnapshotError::Malformed(_))
        ));

        let twice = snapshot(&["n1", "n1"], Vec::new());
        assert!(matches!(
            TopologyModel::build(&twice),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_parent_is_malformed() {
        let dangling = snapshot(&["n1"], vec![pod("p1", Some("n9"), None, true)]);
        assert!(matches!(
            TopologyModel::build(&dangling),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn entity_order_is_canonical() {
        let forward = snapshot(
            &["a", "b"],
            vec![pod("x", Some("a"), None, true), pod("y", Some("b"), None, true)],
        );
        let reversed = snapshot(
            &["b", "a"],
            vec![pod("y", Some("b"), None, true), pod("x", Some("a"), None, true)],
        );

        assert_eq!(
            TopologyModel::build(&forward).expect("valid"),
            TopologyModel::build(&reversed).expect("valid")
        );
    }
}
