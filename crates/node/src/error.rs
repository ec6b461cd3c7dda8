/// The top-level service error channel's payload (§5 "Cancellation", §7
/// "Propagation policy": recoverable chain errors are absorbed inside the
/// block processor and the responder; all other errors propagate to the
/// enclosing service's error channel, which stops the service").
///
/// Every variant here is therefore already a *fatal* condition by the time
/// it reaches [`PisaNode::run`](crate::PisaNode::run) - transient/recoverable
/// errors never leave the crate that absorbed them.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("block-item store error: {0}")]
    Store(#[from] pisa_store::StoreError),
    #[error("block cache error: {0}")]
    Cache(#[from] pisa_block_cache::CacheError),
    #[error("block processor error: {0}")]
    Processor(#[from] pisa_block_processor::ProcessorError),
    #[error("reducer framework error: {0}")]
    Reducer(#[from] pisa_reducer::ReducerError),
    #[error("action store error: {0}")]
    ActionStore(#[from] pisa_action_store::ActionStoreError),
    #[error("appointment store error: {0}")]
    AppointmentStore(#[from] pisa_appointment_store::AppointmentStoreError),
    #[error("ingress surface error: {0}")]
    Ingress(#[from] std::io::Error),
    #[error("signer key error: {0}")]
    SignerKey(String),
    #[error("a background task panicked: {0}")]
    TaskPanicked(#[from] tokio::task::JoinError),
}
