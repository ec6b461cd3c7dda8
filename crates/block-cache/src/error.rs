use pisa_primitives::BlockHash;

/// Errors surfaced by [`crate::BlockCache`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("block-item store error: {0}")]
    Store(#[from] pisa_store::StoreError),
    /// §7 "Application invariant": attempt to `setHead` to a hash the
    /// cache does not have attached. Fatal; the caller's service should
    /// abort after logging.
    #[error("setHead called with unknown or detached block hash {0}")]
    UnknownHead(BlockHash),
}
