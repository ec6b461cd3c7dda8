//! The block-item store (§4.1): a transactional, height-indexed key-value
//! store layered over `sled`, an embedded ordered KV backend.
//!
//! Every other core component - the block cache, the reducer framework, the
//! action store, the appointment store - persists through this one store, so
//! that a crash at any point leaves the on-disk state consistent with the
//! last *committed* batch (§1, §5 "Shared resources").

mod batch;
mod error;
mod key;
mod tagged;

pub use batch::Batch;
pub use error::StoreError;
pub use tagged::{BigInt, Tagged, TagRegistry};

use key::make_key;
use parking_lot::RwLock;
use pisa_primitives::{BlockHash, BlockHeight};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// In-memory mirror of which `(hash, item_key)` pairs live at each height,
/// maintained in lockstep with every committed batch so enumeration never
/// needs to scan the backing store (§4.1).
#[derive(Default)]
struct Index {
    by_height: BTreeMap<BlockHeight, BTreeSet<(BlockHash, String)>>,
    hash_heights: HashMap<BlockHash, BlockHeight>,
}

/// The block-item store.
///
/// Cloning a `BlockItemStore` is cheap and shares the same underlying `sled`
/// database and batch gate - the expected way to hand the store to several
/// components that each open their own batches serially.
#[derive(Clone)]
pub struct BlockItemStore {
    db: sled::Db,
    tree: sled::Tree,
    batch_gate: Arc<AsyncMutex<()>>,
    index: Arc<RwLock<Index>>,
    registry: Arc<TagRegistry>,
}

impl std::fmt::Debug for BlockItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockItemStore").finish_non_exhaustive()
    }
}

impl BlockItemStore {
    /// Opens (creating if necessary) a block-item store backed by a `sled`
    /// database at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Opens a purely in-memory store, for tests and single-process demos.
    pub fn open_temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree("block-item-store")?;
        Ok(Self {
            db,
            tree,
            batch_gate: Arc::new(AsyncMutex::new(())),
            index: Arc::new(RwLock::new(Index::default())),
            registry: Arc::new(TagRegistry::default_registry()),
        })
    }

    /// Opens a sibling namespace in the same underlying `sled` database
    /// (§6 "Persisted layout"'s sibling prefixes like `block-processor/`),
    /// for the handful of singleton values - not height-indexed block
    /// items - that live alongside this store on disk.
    pub fn open_namespace(&self, name: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(name)?)
    }

    /// Opens a batch, waiting up to `timeout` for any in-flight batch to
    /// commit or abort first (§4.1, §5 "Timeouts"). Only one batch may be
    /// open at a time; waiters are served in the order they arrived.
    pub async fn begin_batch(&self, timeout: Duration) -> Result<Batch<'_>, StoreError> {
        let guard = tokio::time::timeout(timeout, self.batch_gate.clone().lock_owned())
            .await
            .map_err(|_| StoreError::BatchTimeout)?;
        Ok(Batch::new(self, guard))
    }

    /// Reads a raw item by `(hash, item_key)`. Returns `Ok(None)` for an
    /// absent key - reads never fail simply because nothing was ever
    /// written there (§7 "read of missing key returns an explicit absent
    /// value").
    pub fn get_item_raw(&self, hash: BlockHash, item_key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let height = match self.index.read().hash_heights.get(&hash) {
            Some(h) => *h,
            None => return Ok(None),
        };
        let key = make_key(height, hash, item_key);
        Ok(self.tree.get(key)?.map(|ivec| ivec.to_vec()))
    }

    /// Reads and decodes a tagged item by `(hash, item_key)`.
    pub fn get_item<T: Tagged>(&self, hash: BlockHash, item_key: &str) -> Result<Option<T>, StoreError> {
        match self.get_item_raw(hash, item_key)? {
            Some(raw) => tagged::decode::<T>(&raw, &self.registry).map(Some),
            None => Ok(None),
        }
    }

    /// Lists every `(hash, item_key)` pair currently stored at `height`,
    /// from the in-memory index (§4.1).
    pub fn items_at_height(&self, height: BlockHeight) -> Vec<(BlockHash, String)> {
        self.index
            .read()
            .by_height
            .get(&height)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The lowest height with at least one item still recorded, if any.
    pub fn min_height(&self) -> Option<BlockHeight> {
        self.index.read().by_height.keys().next().copied()
    }

    fn apply_committed(&self, applied: batch::CommittedOps) {
        let mut index = self.index.write();
        for cleared_height in applied.cleared_heights {
            if let Some(set) = index.by_height.remove(&cleared_height) {
                for (hash, _) in set {
                    index.hash_heights.remove(&hash);
                }
            }
        }
        for (height, hash, item_key) in applied.inserted {
            index.by_height.entry(height).or_default().insert((hash, item_key));
            index.hash_heights.insert(hash, height);
        }
        debug!(heights = index.by_height.len(), "block-item store index updated");
    }
}
