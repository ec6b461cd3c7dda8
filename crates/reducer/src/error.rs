use pisa_primitives::BlockHash;

/// A component-local failure, opaque to the framework. Surfaced by
/// [`crate::ReducerComponent::initial_state`], `reduce`, `detect_changes`
/// and `apply_action`.
pub type ComponentError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`crate::ReducerFramework`].
#[derive(Debug, thiserror::Error)]
pub enum ReducerError {
    #[error("block-item store error: {0}")]
    Store(#[from] pisa_store::StoreError),
    #[error("action store error: {0}")]
    ActionStore(#[from] pisa_action_store::ActionStoreError),
    /// §7 "Application invariant": anchor state missing for the current
    /// head. Per §4.4 "missing is a fatal internal error (it must have
    /// been computed on the preceding 'new block')." Fatal; the caller's
    /// service should abort after logging.
    #[error("missing anchor state for component '{component}' at head {head}")]
    MissingAnchorState { component: &'static str, head: BlockHash },
    /// `initial_state`/`reduce`/`detect_changes` failing is a bug in the
    /// component itself, not a retryable condition - unlike `apply_action`
    /// failures (§7 "`applyAction` failures do not remove the action"),
    /// which are absorbed by the framework and simply retried.
    #[error("component '{component}' failed: {source}")]
    Component { component: &'static str, #[source] source: ComponentError },
}
