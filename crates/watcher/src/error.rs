/// Errors surfaced by [`crate::WatcherComponent`] and its
/// [`crate::ResponseDispatcher`] collaborator.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("appointment store error: {0}")]
    AppointmentStore(#[from] pisa_appointment_store::AppointmentStoreError),
    #[error("failed to (de)serialize watcher anchor state: {0}")]
    Serialize(#[from] postcard::Error),
    #[error("dispatch to multi-responder failed: {0}")]
    Dispatch(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("watcher component received an action it does not own: {0:?}")]
    UnexpectedAction(pisa_primitives::Action),
}

/// The error type [`crate::ResponseDispatcher::start_response`] surfaces;
/// opaque, since the watcher only needs to know "it failed", not why -
/// mirrors [`pisa_reducer::ComponentError`]'s own boxed-error shape.
pub type DispatchError = Box<dyn std::error::Error + Send + Sync>;
