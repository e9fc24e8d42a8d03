use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pose::Pose;

/// Identity of a confirmed tracker-space anchor.
///
/// Issued monotonically from 1 and never reused within a session.
/// `AnchorId::INVALID` (0) marks "no anchor".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub u64);

impl AnchorId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "anchor#{}", self.0)
    }
}

/// Solver-assigned connected-component identifier. Opaque to the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub u64);

impl FragmentId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fragment#{}", self.0)
    }
}

/// Identity of an alignment anchor (pin), issued by the alignment manager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignmentId(pub u64);

impl AlignmentId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for AlignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin#{}", self.0)
    }
}

/// Unordered pair of anchor ids. The smaller id is always stored first,
/// so equal pairs compare equal regardless of construction order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub id1: AnchorId,
    pub id2: AnchorId,
}

impl Edge {
    pub fn new(a: AnchorId, b: AnchorId) -> Self {
        if a <= b {
            Self { id1: a, id2: b }
        } else {
            Self { id1: b, id2: a }
        }
    }

    pub fn contains(&self, id: AnchorId) -> bool {
        self.id1 == id || self.id2 == id
    }

    /// The endpoint that is not `id`, if `id` is an endpoint.
    pub fn other(&self, id: AnchorId) -> Option<AnchorId> {
        if self.id1 == id {
            Some(self.id2)
        } else if self.id2 == id {
            Some(self.id1)
        } else {
            None
        }
    }

    pub fn is_loop(&self) -> bool {
        self.id1 == self.id2
    }
}

/// An anchor's pose in raw tracker (spongy) space for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorPose {
    pub id: AnchorId,
    pub pose: Pose,
}

/// An anchor as held by the solver in locked (frozen) space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrozenAnchor {
    pub id: AnchorId,
    pub fragment: FragmentId,
    pub pose: Pose,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_is_unordered() {
        let a = Edge::new(AnchorId(3), AnchorId(7));
        let b = Edge::new(AnchorId(7), AnchorId(3));
        assert_eq!(a, b);
        assert_eq!(a.id1, AnchorId(3));
    }

    #[test]
    fn test_edge_other() {
        let e = Edge::new(AnchorId(1), AnchorId(2));
        assert_eq!(e.other(AnchorId(1)), Some(AnchorId(2)));
        assert_eq!(e.other(AnchorId(2)), Some(AnchorId(1)));
        assert_eq!(e.other(AnchorId(9)), None);
    }

    #[test]
    fn test_anchor_id_sequence() {
        let id = AnchorId::INVALID.next();
        assert!(id.is_valid());
        assert_eq!(id.next(), AnchorId(2));
    }
}
