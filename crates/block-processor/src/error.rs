/// Errors surfaced by [`crate::BlockProcessor`].
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Provider(#[from] pisa_chain_provider::ProviderError),
    #[error(transparent)]
    Cache(#[from] pisa_block_cache::CacheError),
    #[error(transparent)]
    Store(#[from] pisa_store::StoreError),
    #[error("failed to (de)serialize the persisted block processor head: {0}")]
    Persist(#[from] serde_json::Error),
}
