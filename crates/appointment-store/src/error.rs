/// Errors surfaced by [`crate::AppointmentStore`].
#[derive(Debug, thiserror::Error)]
pub enum AppointmentStoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to (de)serialize a persisted appointment: {0}")]
    Serialize(#[from] postcard::Error),
    /// §4.8: a replacement was rejected because it did not carry a
    /// strictly greater `nonce` than the existing entry for the same
    /// `(customer, id)`. Surfaced by the ingress surface as HTTP 409
    /// (§6 "409 on stale nonce").
    #[error("stale nonce: existing appointment has nonce {existing}, incoming has {incoming}")]
    StaleNonce { existing: u64, incoming: u64 },
}
