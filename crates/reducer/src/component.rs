use crate::ComponentError;
use async_trait::async_trait;
use pisa_primitives::{Action, Block};

/// A component registered with the [`crate::ReducerFramework`] (§4.4):
/// bundles a reducer (`initial_state`/`reduce`), a `detect_changes` and an
/// `apply_action`.
///
/// State is passed across this boundary as already-serialized bytes rather
/// than a generic associated type, so the framework can hold a
/// `Vec<Arc<dyn ReducerComponent>>` of heterogeneous components (the
/// watcher's per-appointment `WatcherState` map, the responder's
/// `ResponderAnchorState`) without needing to be generic over them itself.
/// Each implementation owns its own (de)serialization internally.
#[async_trait]
pub trait ReducerComponent: Send + Sync + std::fmt::Debug {
    /// The name this component is registered and persisted under; anchor
    /// state lives at `"<name>:state"`, the previously-emitted snapshot at
    /// `"<name>:prevEmittedState"` (§4.4).
    fn name(&self) -> &'static str;

    /// `getInitialState(block)` (§4.4): computed when a block has no parent
    /// in the cache, or when the parent carries no state of its own yet.
    async fn initial_state(&self, block: &Block) -> Result<Vec<u8>, ComponentError>;

    /// `reduce(prevState, block)` (§4.4), given the parent's anchor state.
    async fn reduce(&self, prev_state: &[u8], block: &Block) -> Result<Vec<u8>, ComponentError>;

    /// `detectChanges(prevEmittedState, newState)` (§4.4), invoked only on
    /// "new head". `head` is supplied so components whose emission
    /// condition depends on the current head height (the watcher's
    /// confirmation thresholds, §4.5) can read it without re-deriving it
    /// from state.
    fn detect_changes(&self, prev_emitted: &[u8], state: &[u8], head: &Block) -> Result<Vec<Action>, ComponentError>;

    /// `applyAction(action)` (§4.4). Must be idempotent: the framework
    /// retries on the next head if this returns `Err` (§7).
    async fn apply_action(&self, action: Action) -> Result<(), ComponentError>;
}
