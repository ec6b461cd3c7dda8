/// Errors surfaced by [`crate::ActionStore`].
#[derive(Debug, thiserror::Error)]
pub enum ActionStoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to (de)serialize a persisted action: {0}")]
    Serialize(#[from] postcard::Error),
}
