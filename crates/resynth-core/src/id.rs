//! Stable value identifier.
//!
//! A [`ValueId`] is the identity of an object in a [`ValueHeap`](crate::ValueHeap).
//! Two bindings refer to the same object exactly when their ids are equal.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Object identity within a value heap. Maps to a petgraph `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// Bridge between ValueId and petgraph's NodeIndex<u32>.

impl From<NodeIndex<u32>> for ValueId {
    fn from(idx: NodeIndex<u32>) -> Self {
        ValueId(idx.index() as u32)
    }
}

impl From<ValueId> for NodeIndex<u32> {
    fn from(id: ValueId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_id_to_node_index_roundtrip() {
        let idx = NodeIndex::<u32>::new(42);
        let id = ValueId::from(idx);
        assert_eq!(id.0, 42);

        let back: NodeIndex<u32> = id.into();
        assert_eq!(back.index(), 42);
    }

    #[test]
    fn value_id_display() {
        assert_eq!(format!("{}", ValueId(7)), "#7");
    }

    #[test]
    fn serde_is_transparent_number() {
        let json = serde_json::to_string(&ValueId(3)).unwrap();
        assert_eq!(json, "3");
        let back: ValueId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ValueId(3));
    }
}
