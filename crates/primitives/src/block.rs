use crate::{BlockHeight, Log, Transaction};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Opaque block hash, identical in shape to a transaction/log topic hash but
/// kept as a distinct alias so call sites read unambiguously.
pub type BlockHash = B256;

/// A block as observed from the chain provider (§3 "Block" of the spec).
///
/// Attachment is not a field of `Block` itself: it is a property the block
/// cache tracks about a `Block` once it has been added, because the same
/// block can be detached at one moment and attached at the next as its
/// ancestry fills in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: BlockHash,
    pub height: BlockHeight,
    pub parent_hash: BlockHash,
    pub logs: Vec<Log>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Convenience constructor for the genesis of a cache: a block with no
    /// real parent. The hash of a genesis's "parent" is never looked up, so
    /// any placeholder value is safe.
    pub fn genesis(hash: BlockHash, height: BlockHeight) -> Self {
        Self { hash, height, parent_hash: BlockHash::ZERO, logs: Vec::new(), transactions: Vec::new() }
    }
}
