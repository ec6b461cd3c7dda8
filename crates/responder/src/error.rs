/// Errors surfaced by [`crate::MultiResponder`] and its `GasEstimator`/
/// `TransactionSigner` collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    #[error("chain provider error: {0}")]
    Provider(#[from] pisa_chain_provider::ProviderError),
    #[error("signer error: {0}")]
    Signer(#[from] crate::signer::SignerError),
    #[error("gas estimator error: {0}")]
    Gas(#[from] crate::gas::GasEstimatorError),
    #[error("failed to (de)serialize responder anchor state: {0}")]
    Serialize(#[from] postcard::Error),
    /// §4.6 step 5: a broadcast that never lands after
    /// `max_broadcast_retries` bounded, backed-off attempts.
    #[error("broadcast failed permanently after {attempts} attempts: {source}")]
    BroadcastExhausted { attempts: u32, #[source] source: pisa_chain_provider::ProviderError },
    #[error("no pending transaction tracked at nonce {0}")]
    UnknownNonce(u64),
    #[error("multi-responder received an action it does not own: {0:?}")]
    UnexpectedAction(pisa_primitives::Action),
}
