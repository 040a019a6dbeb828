//! Operator metadata: pattern kinds and the per-module operator registry.

use serde::{Deserialize, Serialize};

/// Stable identifier for an operator registered on a [`Module`](crate::ir::Module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

/// Computation shape of an operator, dictating what it may fuse with.
///
/// The ordering is significant: combining the patterns along a dataflow path
/// keeps the *worst* (largest) one, so any path containing an opaque edge is
/// opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OpPattern {
    /// Element-wise: each output element depends on the same element of each input.
    Elemwise = 0,
    /// Element-wise over broadcast-aligned inputs, e.g. `bias_add`.
    Broadcast = 1,
    /// One-to-one index mapping, e.g. `reshape`, `transpose`.
    Injective = 2,
    /// Reduction with a commutative and associative combiner.
    CommReduce = 3,
    /// Complex kernel whose output is still element-wise fusable, e.g. `conv2d`.
    OutElemwiseFusable = 4,
    /// Tuple-packing node.
    Tuple = 5,
    /// Not fusable.
    Opaque = 6,
}

impl OpPattern {
    /// Folds two patterns into the worst of the pair.
    pub fn combine(self, other: OpPattern) -> OpPattern {
        self.max(other)
    }

    /// Display name used by debug dumps.
    pub fn name(self) -> &'static str {
        match self {
            OpPattern::Elemwise => "elemwise",
            OpPattern::Broadcast => "broadcast",
            OpPattern::Injective => "injective",
            OpPattern::CommReduce => "comm_reduce",
            OpPattern::OutElemwiseFusable => "out_elemwise_fusable",
            OpPattern::Tuple => "tuple",
            OpPattern::Opaque => "opaque",
        }
    }
}

/// Registered metadata for a single operator.
#[derive(Debug, Clone)]
pub struct OpDecl {
    pub name: String,
    pub pattern: OpPattern,
}

#[cfg(test)]
mod tests {
    use super::OpPattern;

    const ALL: [OpPattern; 7] = [
        OpPattern::Elemwise,
        OpPattern::Broadcast,
        OpPattern::Injective,
        OpPattern::CommReduce,
        OpPattern::OutElemwiseFusable,
        OpPattern::Tuple,
        OpPattern::Opaque,
    ];

    #[test]
    fn combine_is_commutative_and_idempotent() {
        for a in ALL {
            assert_eq!(a.combine(a), a);
            for b in ALL {
                assert_eq!(a.combine(b), b.combine(a));
            }
        }
    }

    #[test]
    fn combine_is_associative() {
        for a in ALL {
            for b in ALL {
                for c in ALL {
                    assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
                }
            }
        }
    }

    #[test]
    fn opaque_dominates_every_pattern() {
        for a in ALL {
            assert_eq!(a.combine(OpPattern::Opaque), OpPattern::Opaque);
        }
    }
}
