//! The block processor (§4.3): pulls blocks from the chain provider, feeds
//! them into the block cache, and emits "new head" once the cache has
//! absorbed the head and all of its in-cache ancestors.

mod error;

pub use error::ProcessorError;

use pisa_block_cache::{AddResult, BlockCache};
use pisa_chain_provider::{BlockId, ChainProvider};
use pisa_primitives::{Block, BlockHeight, Event};
use pisa_store::BlockItemStore;
use serde::{Deserialize, Serialize};
use std::sync::{atomic::{AtomicU64, Ordering}, Arc};
use tokio_stream::StreamExt;
use tracing::{info, warn};

const HEAD_NAMESPACE: &str = "block-processor";
const HEAD_KEY: &[u8] = b"head";

#[derive(Serialize, Deserialize)]
struct PersistedHead {
    head: BlockHeight,
}

/// The block processor (§4.3). Generic over the chain provider so tests can
/// swap in an in-memory fake.
pub struct BlockProcessor<P: ChainProvider> {
    provider: Arc<P>,
    cache: BlockCache,
    head_tree: sled::Tree,
    new_head: Event<Block>,
    last_received_height: AtomicU64,
    has_received: std::sync::atomic::AtomicBool,
}

impl<P: ChainProvider> std::fmt::Debug for BlockProcessor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockProcessor").finish_non_exhaustive()
    }
}

impl<P: ChainProvider> BlockProcessor<P> {
    pub fn new(provider: Arc<P>, cache: BlockCache, store: &BlockItemStore) -> Result<Self, ProcessorError> {
        let head_tree = store.open_namespace(HEAD_NAMESPACE)?;
        Ok(Self {
            provider,
            cache,
            head_tree,
            new_head: Event::new(),
            last_received_height: AtomicU64::new(0),
            has_received: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Subscribes to "new head" events, fired after the cache has absorbed
    /// the head and all of its currently-fetchable ancestors (§4.3).
    pub fn new_head_event(&self) -> &Event<Block> {
        &self.new_head
    }

    /// The persisted head number from a prior run, if any (§4.3 "The latest
    /// observed head number is persisted after each head update").
    pub fn persisted_head(&self) -> Result<Option<BlockHeight>, ProcessorError> {
        match self.head_tree.get(HEAD_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice::<PersistedHead>(&bytes)?.head)),
            None => Ok(None),
        }
    }

    fn persist_head(&self, height: BlockHeight) -> Result<(), ProcessorError> {
        let bytes = serde_json::to_vec(&PersistedHead { head: height })?;
        self.head_tree.insert(HEAD_KEY, bytes)?;
        Ok(())
    }

    /// Resolves the height to start watching from: the persisted head if
    /// one exists, otherwise the provider's current height (§4.3 "On
    /// startup, if a persisted head exists, resume from it; otherwise from
    /// the provider's current height").
    pub async fn resume_height(&self) -> Result<BlockHeight, ProcessorError> {
        if let Some(height) = self.persisted_head()? {
            return Ok(height);
        }
        Ok(self.provider.block_number().await?)
    }

    /// Drives the processor off the provider's push subscription until the
    /// stream ends (provider connection lost), which is fatal (§7).
    pub async fn run(&self) -> Result<(), ProcessorError> {
        let mut stream = self.provider.subscribe_blocks();
        while let Some(height) = stream.next().await {
            self.on_block_number(height).await?;
        }
        Ok(())
    }

    fn target_for(&self, n: BlockHeight) -> BlockHeight {
        match self.cache.head_opt() {
            None => n,
            Some(head_hash) => {
                let head_height = self.cache.get_block(head_hash).map(|b| b.height).unwrap_or(n);
                n.min(head_height + self.cache.max_depth())
            }
        }
    }

    /// Handles one "block" notification at height `n` (§4.3 steps 1-7).
    pub async fn on_block_number(&self, n: BlockHeight) -> Result<(), ProcessorError> {
        self.last_received_height.store(n, Ordering::SeqCst);
        self.has_received.store(true, Ordering::SeqCst);

        loop {
            let target = self.target_for(n);

            let fetched = match self.provider.get_block(BlockId::Number(target)).await {
                Ok(Some(block)) => block,
                Ok(None) => {
                    info!(target, "chain provider has no block at target height yet");
                    return Ok(());
                }
                Err(e) if e.is_recoverable() => {
                    info!(error = %e, target, "recoverable chain error fetching target block, retrying next tick");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            if !self.cache.has_block(fetched.hash, true) {
                if let Some(outcome) = self.add_with_ancestors(fetched.clone()).await? {
                    if outcome.current.hash == fetched.hash && outcome.result != AddResult::NotAddedBlockNumberTooLow {
                        self.cache.set_head(fetched.hash).await?;
                        self.persist_head(fetched.height)?;
                        self.new_head.emit(fetched.clone()).await;
                        metrics::gauge!(pisa_metrics::CACHE_HEAD_HEIGHT, fetched.height as f64);
                    }
                } else {
                    // Ran into a recoverable error or a missing parent while
                    // backfilling ancestors; try again next tick.
                    return Ok(());
                }
            }

            if target < n {
                continue;
            }
            break;
        }

        Ok(())
    }

    /// Step 5: starting from `fetched`, add it; while the result is
    /// detached, fetch the parent (cache first, then remotely) and add it
    /// instead, repeating until an add is not detached. Returns `None` if a
    /// parent fetch hits a recoverable error or comes back empty.
    async fn add_with_ancestors(&self, fetched: Block) -> Result<Option<AddOutcome>, ProcessorError> {
        let mut current = fetched;
        loop {
            let result = self.cache.add_block(current.clone()).await?;
            if result != AddResult::AddedDetached {
                return Ok(Some(AddOutcome { current, result }));
            }

            let parent = match self.cache.get_block(current.parent_hash) {
                Some(parent) => parent,
                None => match self.provider.get_block(BlockId::Hash(current.parent_hash)).await {
                    Ok(Some(parent)) => parent,
                    Ok(None) => {
                        info!(parent_hash = %current.parent_hash, "parent block not found while backfilling ancestry");
                        return Ok(None);
                    }
                    Err(e) if e.is_recoverable() => {
                        info!(error = %e, "recoverable chain error backfilling ancestry, retrying next tick");
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                },
            };
            current = parent;
        }
    }
}

struct AddOutcome {
    current: Block,
    result: AddResult,
}
