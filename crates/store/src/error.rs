/// Errors surfaced by the block-item store (§4.1, §7 "Store").
///
/// A write failure here is fatal per §7: the batch that produced it is
/// aborted and the caller receives this error, leaving the store in the
/// state of its last successfully committed batch.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] postcard::Error),
    #[error("unknown tag '{0}' encountered while deserializing a stored item")]
    UnknownTag(String),
    #[error("tag mismatch: expected '{expected}', found '{found}'")]
    TagMismatch { expected: &'static str, found: String },
    #[error("timed out waiting to open a block-item store batch")]
    BatchTimeout,
}
