use super::RawSnapshot;

#[derive(PartialEq, Eq)]
struct CanonicalSnapshot<'a> {
    nodes: Option<Vec<&'a str>>,
    pods: Option<Vec<CanonicalPod<'a>>>,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct CanonicalPod<'a> {
    name: &'a str,
    node: Option<&'a str>,
    deployment: Option<&'a str>,
    ready: bool,
}

impl<'a> CanonicalSnapshot<'a> {
    fn of(snapshot: &'a RawSnapshot) -> Self {
        let nodes = snapshot.nodes.as_ref().map(|nodes| {
            let mut names = nodes.iter().map(|node| node.name.as_str()).collect::<Vec<_>>();
            names.sort_unstable();
            names
        });

        let pods = snapshot.pods.as_ref().map(|pods| {
            let mut pods = pods
                .iter()
                .map(|pod| CanonicalPod {
                    name: pod.name.as_str(),
                    node: pod.node_name(),
                    deployment: pod.deployment_name(),
                    ready: pod.is_ready(),
                })
                .collect::<Vec<_>>();
            pods.sort_unstable();
            pods
        });

        Self { nodes, pods }
    }
}

/// Structural comparison that ignores list order, so a backend that returns
/// the same pods shuffled does not restart the layout.
pub fn has_changed(previous: Option<&RawSnapshot>, next: &RawSnapshot) -> bool {
    match previous {
        None => true,
        Some(previous) => CanonicalSnapshot::of(previous) != CanonicalSnapshot::of(next),
    }
}
