mod diff;
mod error;
mod model;
mod snapshot;

pub use diff::has_changed;
pub use error::SnapshotError;
pub use model::{EntityKind, TopologyModel, WorkloadUnit};
pub use snapshot::{RawNode, RawPod, RawSnapshot, parse_snapshot};
