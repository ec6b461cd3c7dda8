use crate::{Appointment, AppointmentId, BlockHeight, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fresh identifier assigned to an [`Action`] when it is persisted to the
/// action store (§4.7); actions are unique per `(component, uuid)`.
pub type ActionId = Uuid;

/// A side-effect produced by a component's `detectChanges` (§3 "Action").
///
/// `StartResponse`/`RemoveAppointment` are emitted by the watcher;
/// `ReissueTransaction`/`RetireTransaction` by the multi-responder. They
/// share one enum so the action store and reducer framework can stay
/// generic over "the thing a component wants applied", while each
/// component's `applyAction` only ever receives the variants it itself
/// emits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Dispatch the appointment's transaction; `block_observed` is the
    /// height at which the triggering condition first held.
    StartResponse { appointment: Box<Appointment>, block_observed: BlockHeight },
    /// Delete the appointment from the appointment store.
    RemoveAppointment { id: AppointmentId },
    /// Re-broadcast the transaction at `nonce` with a strictly higher price.
    ReissueTransaction { nonce: u64, new_gas_price: U256 },
    /// The transaction at `nonce` is settled (confirmed or abandoned);
    /// release the nonce.
    RetireTransaction { nonce: u64 },
}

/// Alias kept for readability at action-store call sites, which always
/// handle `(ActionId, Action)` pairs together.
pub type ActionPayload = (ActionId, Action);
