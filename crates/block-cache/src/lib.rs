//! The block cache (§4.2): an in-memory chain of recently-observed blocks,
//! persisted through the block-item store, that enforces the
//! detached/attached discipline described in §3 "Cache invariants".
//!
//! A block is *attached* once its parent is attached or it sits at the
//! cache's pruning floor; everything else is *detached* - present, but not
//! yet known to connect to the rest of the chain. Only attached blocks ever
//! fire the "new block" event that the rest of the core reacts to.

mod error;
mod stored;

pub use error::CacheError;

use parking_lot::RwLock;
use pisa_primitives::{Block, BlockHash, BlockHeight, Event};
use pisa_store::BlockItemStore;
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};
use stored::{Attached, StoredBlock};
use tracing::{debug, info};

const BLOCK_ITEM_KEY: &str = "block";
const ATTACHED_ITEM_KEY: &str = "attached";

/// Outcome of [`BlockCache::add_block`] (§3 "AddResult").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddResult {
    Added,
    AddedDetached,
    NotAddedAlreadyExisted,
    NotAddedAlreadyExistedDetached,
    NotAddedBlockNumberTooLow,
}

impl AddResult {
    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added | Self::AddedDetached)
    }
}

#[derive(Default)]
struct CacheState {
    is_empty: bool,
    head: Option<BlockHash>,
    max_height: Option<BlockHeight>,
    min_height: Option<BlockHeight>,
    first_observed_height: Option<BlockHeight>,
    /// `true` = attached, `false` = detached. Absence means never seen.
    attached: HashMap<BlockHash, bool>,
    parent_of: HashMap<BlockHash, BlockHash>,
    height_of: HashMap<BlockHash, BlockHeight>,
    by_height: BTreeMap<BlockHeight, HashSet<BlockHash>>,
    blocks: HashMap<BlockHash, Block>,
}

impl CacheState {
    fn remove_block(&mut self, hash: &BlockHash) {
        self.attached.remove(hash);
        self.parent_of.remove(hash);
        self.height_of.remove(hash);
        self.blocks.remove(hash);
    }
}

/// The block cache (§4.2). Cheap to clone: every clone shares the same
/// in-memory state and underlying store.
#[derive(Clone)]
pub struct BlockCache {
    store: BlockItemStore,
    max_depth: BlockHeight,
    batch_timeout: Duration,
    /// Serializes every mutating call so the detached/attached discipline
    /// holds across the whole critical section, including the store I/O
    /// inside it (§4.2 step 1, §5 "One mutex per block cache").
    mutate_lock: Arc<tokio::sync::Mutex<()>>,
    state: Arc<RwLock<CacheState>>,
    new_block: Event<Block>,
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("BlockCache")
            .field("max_depth", &self.max_depth)
            .field("head", &state.head)
            .field("max_height", &state.max_height)
            .field("min_height", &state.min_height)
            .finish()
    }
}

impl BlockCache {
    pub fn new(store: BlockItemStore, max_depth: BlockHeight, batch_timeout: Duration) -> Self {
        Self {
            store,
            max_depth,
            batch_timeout,
            mutate_lock: Arc::new(tokio::sync::Mutex::new(())),
            state: Arc::new(RwLock::new(CacheState::default())),
            new_block: Event::new(),
        }
    }

    /// Subscribes to the "new block" event: fired once, in height order,
    /// each time a block becomes attached - including on promotion when a
    /// previously-detached block's ancestry fills in (§4.2 step 5).
    pub fn new_block_event(&self) -> &Event<Block> {
        &self.new_block
    }

    pub fn max_depth(&self) -> BlockHeight {
        self.max_depth
    }

    pub fn max_height(&self) -> Option<BlockHeight> {
        self.state.read().max_height
    }

    pub fn min_height(&self) -> Option<BlockHeight> {
        self.state.read().min_height
    }

    /// The current head. Panics if no head has ever been set - per §4.2,
    /// "`head` is set externally by the block processor; reading `head`
    /// before it is set is a programming error."
    pub fn head(&self) -> BlockHash {
        self.state.read().head.expect("BlockCache::head read before any head was ever set")
    }

    pub fn head_opt(&self) -> Option<BlockHash> {
        self.state.read().head
    }

    /// Sets the current head (§4.2). `hash` must already be an attached
    /// block in the cache; calling this with an unknown hash is the
    /// application-invariant violation named in §7 ("attempt to `setHead`
    /// to an unknown hash") and returns a fatal [`CacheError`].
    pub async fn set_head(&self, hash: BlockHash) -> Result<(), CacheError> {
        let _guard = self.mutate_lock.lock().await;
        let mut state = self.state.write();
        match state.attached.get(&hash) {
            Some(true) => {
                state.head = Some(hash);
                if let Some(&height) = state.height_of.get(&hash) {
                    metrics::gauge!(pisa_metrics::CACHE_HEAD_HEIGHT, height as f64);
                }
                Ok(())
            }
            _ => Err(CacheError::UnknownHead(hash)),
        }
    }

    pub fn get_block(&self, hash: BlockHash) -> Option<Block> {
        self.state.read().blocks.get(&hash).cloned()
    }

    pub fn has_block(&self, hash: BlockHash, include_detached: bool) -> bool {
        match self.state.read().attached.get(&hash) {
            Some(true) => true,
            Some(false) => include_detached,
            None => false,
        }
    }

    pub fn get_blocks_at_height(&self, height: BlockHeight) -> Vec<Block> {
        let state = self.state.read();
        state
            .by_height
            .get(&height)
            .map(|hashes| hashes.iter().filter_map(|h| state.blocks.get(h).cloned()).collect())
            .unwrap_or_default()
    }

    /// A lazy sequence starting at `hash` and following parent links,
    /// stopping when the parent is absent from the cache (§4.2).
    pub fn ancestry(&self, hash: BlockHash) -> Ancestry<'_> {
        Ancestry { cache: self, next: Some(hash) }
    }

    /// Walks `ancestry(hash)`, stopping at the first block matching
    /// `predicate`, and never descending below `min_height` (§4.2).
    pub fn find_ancestor(
        &self,
        hash: BlockHash,
        min_height: BlockHeight,
        mut predicate: impl FnMut(&Block) -> bool,
    ) -> Option<Block> {
        for block in self.ancestry(hash) {
            if block.height < min_height {
                return None;
            }
            if predicate(&block) {
                return Some(block);
            }
        }
        None
    }

    /// `addBlock(b)` (§4.2 algorithm).
    pub async fn add_block(&self, block: Block) -> Result<AddResult, CacheError> {
        let _guard = self.mutate_lock.lock().await;

        {
            let state = self.state.read();
            match state.attached.get(&block.hash) {
                Some(true) => return Ok(AddResult::NotAddedAlreadyExisted),
                Some(false) => return Ok(AddResult::NotAddedAlreadyExistedDetached),
                None => {}
            }
            if let Some(min_height) = state.min_height {
                if block.height < min_height {
                    return Ok(AddResult::NotAddedBlockNumberTooLow);
                }
            }
        }

        let was_empty = {
            let mut state = self.state.write();
            let was_empty = !state.is_empty;
            if was_empty {
                state.is_empty = true;
                state.min_height = Some(block.height);
                state.first_observed_height = Some(block.height);
                info!(height = block.height, "block cache seeded, prune floor adopted");
            }
            was_empty
        };

        let attachable = {
            let state = self.state.read();
            was_empty
                || state.attached.get(&block.parent_hash).copied() == Some(true)
                || Some(block.height) == state.min_height
        };

        if !attachable {
            self.persist_block(&block, false).await?;
            let mut state = self.state.write();
            insert_block(&mut state, block.clone(), false);
            return Ok(AddResult::AddedDetached);
        }

        self.persist_block(&block, true).await?;
        {
            let mut state = self.state.write();
            insert_block(&mut state, block.clone(), true);
            metrics::gauge!(pisa_metrics::CACHE_SIZE, state.blocks.len() as f64);
        }
        self.new_block.emit(block.clone()).await;

        self.bump_max_height_and_prune(block.height).await?;
        self.promote_descendants(block.hash).await?;

        Ok(AddResult::Added)
    }

    async fn persist_block(&self, block: &Block, attached: bool) -> Result<(), CacheError> {
        let mut batch = self.store.begin_batch(self.batch_timeout).await?;
        batch.put(block.height, block.hash, BLOCK_ITEM_KEY, &StoredBlock(block.clone()))?;
        batch.put(block.height, block.hash, ATTACHED_ITEM_KEY, &Attached(attached))?;
        batch.commit()?;
        Ok(())
    }

    async fn bump_max_height_and_prune(&self, new_height: BlockHeight) -> Result<(), CacheError> {
        let should_prune = {
            let mut state = self.state.write();
            if state.max_height.map(|h| new_height > h).unwrap_or(true) {
                state.max_height = Some(new_height);
                true
            } else {
                false
            }
        };
        if !should_prune {
            return Ok(());
        }

        let (old_min, new_min) = {
            let state = self.state.read();
            let first_observed = state.first_observed_height.unwrap_or(new_height);
            let floor = new_height.saturating_sub(self.max_depth);
            let new_min = floor.max(first_observed);
            (state.min_height.unwrap_or(new_min), new_min)
        };

        if new_min <= old_min {
            return Ok(());
        }

        let mut batch = self.store.begin_batch(self.batch_timeout).await?;
        for height in old_min..new_min {
            batch.delete_height(height);
        }
        batch.commit()?;

        let mut state = self.state.write();
        for height in old_min..new_min {
            if let Some(hashes) = state.by_height.remove(&height) {
                for hash in hashes {
                    state.remove_block(&hash);
                }
            }
        }
        state.min_height = Some(new_min);
        debug!(old_min, new_min, "block cache pruned below floor");
        Ok(())
    }

    /// BFS over currently-detached blocks whose parent has just become
    /// attached, marking each attached in turn (§4.2 step 5: "walk forward
    /// height-by-height ... repeat while promotions occur").
    async fn promote_descendants(&self, from: BlockHash) -> Result<(), CacheError> {
        let mut queue = VecDeque::from([from]);
        while let Some(parent_hash) = queue.pop_front() {
            let candidates = {
                let state = self.state.read();
                let Some(&parent_height) = state.height_of.get(&parent_hash) else { continue };
                let child_height = parent_height + 1;
                state
                    .by_height
                    .get(&child_height)
                    .into_iter()
                    .flatten()
                    .filter(|hash| {
                        state.attached.get(*hash).copied() == Some(false)
                            && state.parent_of.get(*hash) == Some(&parent_hash)
                    })
                    .copied()
                    .collect::<Vec<_>>()
            };

            for child_hash in candidates {
                let block = {
                    let state = self.state.read();
                    state.blocks.get(&child_hash).cloned()
                };
                let Some(block) = block else { continue };

                self.persist_block(&block, true).await?;
                {
                    let mut state = self.state.write();
                    state.attached.insert(child_hash, true);
                }
                self.new_block.emit(block).await;
                queue.push_back(child_hash);
            }
        }
        Ok(())
    }
}

fn insert_block(state: &mut CacheState, block: Block, attached: bool) {
    let hash = block.hash;
    let height = block.height;
    state.attached.insert(hash, attached);
    state.parent_of.insert(hash, block.parent_hash);
    state.height_of.insert(hash, height);
    state.by_height.entry(height).or_default().insert(hash);
    state.blocks.insert(hash, block);
}

/// A lazy ancestry walk, per §4.2's `ancestry(hash)`: stops as soon as the
/// cache has no record of the next parent, rather than erroring.
pub struct Ancestry<'a> {
    cache: &'a BlockCache,
    next: Option<BlockHash>,
}

impl Iterator for Ancestry<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        let block = self.cache.get_block(hash)?;
        self.next = Some(block.parent_hash);
        Some(block)
    }
}
