use crate::{key::make_key, tagged, BlockItemStore, StoreError, Tagged};
use pisa_primitives::{BlockHash, BlockHeight};
use tokio::sync::OwnedMutexGuard;

/// What a committed batch changed, handed back to [`BlockItemStore`] so it
/// can update its in-memory index without re-reading `sled` (§4.1).
pub(crate) struct CommittedOps {
    pub(crate) cleared_heights: Vec<BlockHeight>,
    pub(crate) inserted: Vec<(BlockHeight, BlockHash, String)>,
}

enum Op {
    Put { height: BlockHeight, hash: BlockHash, item_key: String, value: Vec<u8>, register_tag: Option<&'static str> },
    DeleteHeight(BlockHeight),
}

/// A single open batch against a [`BlockItemStore`] (§4.1).
///
/// Only one batch may be open at a time - holding this value *is* holding
/// that right, via the owned guard on the store's batch gate. Puts are
/// buffered in memory and only reach `sled` on [`Batch::commit`]; dropping a
/// batch without committing (or calling [`Batch::abort`] explicitly) leaves
/// no trace, matching §7's "on abort or crash, none [of the changes]
/// [become visible]".
#[must_use = "a batch must be committed or aborted, or its writes are silently dropped"]
pub struct Batch<'a> {
    store: &'a BlockItemStore,
    _guard: OwnedMutexGuard<()>,
    ops: Vec<Op>,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(store: &'a BlockItemStore, guard: OwnedMutexGuard<()>) -> Self {
        Self { store, _guard: guard, ops: Vec::new() }
    }

    /// Buffers a typed put. The item's tag is registered with the store's
    /// [`crate::TagRegistry`] on [`Batch::commit`], so a later read of this
    /// same type never trips the unknown-tag failure path (§9).
    pub fn put<T: Tagged>(
        &mut self,
        height: BlockHeight,
        hash: BlockHash,
        item_key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = tagged::encode(value)?;
        self.ops.push(Op::Put {
            height,
            hash,
            item_key: item_key.to_string(),
            value: bytes,
            register_tag: Some(T::TAG),
        });
        Ok(())
    }

    /// Buffers a put of an already-encoded record, without registering any
    /// tag. Exists for tests that want to exercise the unknown-tag path and
    /// for callers migrating raw bytes between stores.
    pub fn put_raw(&mut self, height: BlockHeight, hash: BlockHash, item_key: &str, value: Vec<u8>) {
        self.ops.push(Op::Put { height, hash, item_key: item_key.to_string(), value, register_tag: None });
    }

    /// Buffers deletion of every item currently recorded at `height`
    /// (§4.1 "delete all items at a height"), used by the block cache's
    /// pruning pass.
    pub fn delete_height(&mut self, height: BlockHeight) {
        self.ops.push(Op::DeleteHeight(height));
    }

    /// Applies every buffered operation to `sled` in one atomic write, then
    /// updates the store's in-memory index. All changes become visible to
    /// readers together (§4.1).
    pub fn commit(self) -> Result<(), StoreError> {
        let mut sled_batch = sled::Batch::default();
        let mut cleared_heights = Vec::new();
        let mut inserted = Vec::new();

        for op in &self.ops {
            match op {
                Op::DeleteHeight(height) => {
                    cleared_heights.push(*height);
                    for (hash, item_key) in self.store.items_at_height(*height) {
                        sled_batch.remove(make_key(*height, hash, &item_key));
                    }
                }
                Op::Put { height, hash, item_key, value, .. } => {
                    sled_batch.insert(make_key(*height, *hash, item_key), value.clone());
                }
            }
        }

        self.store.tree.apply_batch(sled_batch)?;

        for op in &self.ops {
            if let Op::Put { height, hash, item_key, register_tag, .. } = op {
                inserted.push((*height, *hash, item_key.clone()));
                if let Some(tag) = register_tag {
                    self.store.registry.register(tag);
                }
            }
        }

        self.store.apply_committed(CommittedOps { cleared_heights, inserted });
        Ok(())
    }

    /// Discards every buffered operation; equivalent to letting the batch
    /// drop, spelled out for call sites that want to be explicit about it.
    pub fn abort(self) {}
}
