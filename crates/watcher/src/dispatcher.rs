use crate::error::DispatchError;
use async_trait::async_trait;
use pisa_primitives::{Appointment, BlockHeight};

/// The seam between the watcher and the multi-responder (§4.5
/// "`applyAction(StartResponse)` calls the multi-responder").
///
/// Kept as a trait here, rather than a direct dependency on
/// `pisa-responder`, the way [`pisa_chain_provider::ChainProvider`] keeps
/// the block processor from depending on a concrete RPC client: `pisa-node`
/// wires a `pisa_responder::MultiResponder` in as the concrete
/// implementation at start-up.
#[async_trait]
pub trait ResponseDispatcher: Send + Sync + std::fmt::Debug {
    /// Dispatches the appointment's transaction (§4.6 `startResponse`).
    /// `block_observed` is the height at which the triggering condition
    /// first held (§3 "Action").
    async fn start_response(&self, appointment: &Appointment, block_observed: BlockHeight) -> Result<(), DispatchError>;
}
