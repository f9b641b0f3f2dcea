use serde::{Deserialize, Serialize};

/// Identifies a node within one [`LinkComponent`](crate::component::LinkComponent).
/// Dense, component-local, cheap to copy and compare.
///
/// All algorithms in this crate iterate nodes in ascending `NodeIndex` order.
/// That pins the insertion order of the probe algorithm's FIFO queues and the
/// tie-break of the minimized-distance sort, so results are reproducible for
/// a fixed node ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub u16);

impl NodeIndex {
    /// The index as a `usize`, for direct slice access.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
