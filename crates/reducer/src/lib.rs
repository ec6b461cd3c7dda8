//! The reducer framework (§4.4): for every observed block, recomputes each
//! registered component's anchor state; on every new head, compares the
//! state last emitted against the current state and turns the difference
//! into actions.
//!
//! This is the hinge of the whole core: the block cache and block processor
//! only ever produce two events ("new block", "new head"), and everything a
//! component (watcher, multi-responder) does is expressed as a reaction to
//! one of those two events, serialized by one coordinating mutex so that,
//! for any given head, the entire fanout over components completes before
//! the next event begins (§5).

mod component;
mod error;

pub use component::ReducerComponent;
pub use error::{ComponentError, ReducerError};

use pisa_block_cache::BlockCache;
use pisa_action_store::ActionStore;
use pisa_primitives::Block;
use pisa_store::BlockItemStore;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

fn state_key(name: &str) -> String {
    format!("{name}:state")
}

fn prev_emitted_key(name: &str) -> String {
    format!("{name}:prevEmittedState")
}

/// The reducer framework (§4.4). Owns no components of its own; they are
/// registered with [`ReducerFramework::register`] before the cache's
/// "new block" and the processor's "new head" events are wired to
/// [`ReducerFramework::on_new_block`]/[`ReducerFramework::on_new_head`].
pub struct ReducerFramework {
    store: BlockItemStore,
    cache: BlockCache,
    action_store: ActionStore,
    batch_timeout: Duration,
    components: Vec<Arc<dyn ReducerComponent>>,
    /// "One global reducer-framework mutex serializes all reactions to
    /// 'new block' and 'new head'" (§5).
    mutex: Mutex<()>,
}

impl std::fmt::Debug for ReducerFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReducerFramework")
            .field("components", &self.components.iter().map(|c| c.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl ReducerFramework {
    pub fn new(store: BlockItemStore, cache: BlockCache, action_store: ActionStore, batch_timeout: Duration) -> Self {
        Self { store, cache, action_store, batch_timeout, components: Vec::new(), mutex: Mutex::new(()) }
    }

    /// Registers a component. Must be called before the framework is wired
    /// to the cache/processor events; components registered afterward would
    /// not see blocks already processed.
    pub fn register(&mut self, component: Arc<dyn ReducerComponent>) {
        self.components.push(component);
    }

    /// Reacts to the block cache's "new block" event for `block` (§4.4).
    pub async fn on_new_block(&self, block: Block) -> Result<(), ReducerError> {
        let _guard = self.mutex.lock().await;
        let parent = self.cache.get_block(block.parent_hash);

        let mut batch = self.store.begin_batch(self.batch_timeout).await?;
        for component in &self.components {
            let name = component.name();
            let new_state = match &parent {
                Some(parent_block) => {
                    let prev_anchor = match self.store.get_item_raw(parent_block.hash, &state_key(name))? {
                        Some(bytes) => bytes,
                        None => self.call_component(name, component.initial_state(parent_block)).await?,
                    };
                    self.call_component(name, component.reduce(&prev_anchor, &block)).await?
                }
                None => self.call_component(name, component.initial_state(&block)).await?,
            };

            batch.put_raw(block.height, block.hash, &state_key(name), new_state);

            if let Some(parent_block) = &parent {
                if let Some(prev_emitted) = self.store.get_item_raw(parent_block.hash, &prev_emitted_key(name))? {
                    batch.put_raw(block.height, block.hash, &prev_emitted_key(name), prev_emitted);
                }
            }
        }
        batch.commit()?;
        trace!(hash = %block.hash, height = block.height, "reducer framework advanced anchor state for new block");
        Ok(())
    }

    /// Reacts to the block processor's "new head" event for `head` (§4.4).
    pub async fn on_new_head(&self, head: Block) -> Result<(), ReducerError> {
        let _guard = self.mutex.lock().await;

        for component in &self.components {
            let name = component.name();
            let state = self
                .store
                .get_item_raw(head.hash, &state_key(name))?
                .ok_or(ReducerError::MissingAnchorState { component: name, head: head.hash })?;
            let prev_emitted = self.store.get_item_raw(head.hash, &prev_emitted_key(name))?;

            {
                let mut batch = self.store.begin_batch(self.batch_timeout).await?;
                batch.put_raw(head.height, head.hash, &prev_emitted_key(name), state.clone());
                batch.commit()?;
            }

            if let Some(prev_emitted) = prev_emitted {
                let actions = component
                    .detect_changes(&prev_emitted, &state, &head)
                    .map_err(|source| ReducerError::Component { component: name, source })?;
                if !actions.is_empty() {
                    debug!(component = name, count = actions.len(), "detected actions at new head");
                    self.action_store.store_actions(name, actions)?;
                }
            }

            for (id, action) in self.action_store.get_actions(name) {
                match component.apply_action(action).await {
                    Ok(()) => self.action_store.remove_action(name, id)?,
                    Err(source) => {
                        warn!(component = name, action_id = %id, error = %source, "apply_action failed, will retry next head");
                    }
                }
            }
        }
        Ok(())
    }

    async fn call_component<F>(&self, name: &'static str, fut: F) -> Result<Vec<u8>, ReducerError>
    where
        F: std::future::Future<Output = Result<Vec<u8>, ComponentError>>,
    {
        fut.await.map_err(|source| ReducerError::Component { component: name, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pisa_primitives::{Action, AppointmentId, BlockHash};
    use std::sync::Arc;

    #[derive(Debug)]
    struct CountingComponent;

    #[async_trait]
    impl ReducerComponent for CountingComponent {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn initial_state(&self, _block: &Block) -> Result<Vec<u8>, ComponentError> {
            Ok(0u64.to_be_bytes().to_vec())
        }

        async fn reduce(&self, prev_state: &[u8], _block: &Block) -> Result<Vec<u8>, ComponentError> {
            let prev = u64::from_be_bytes(prev_state.try_into().unwrap());
            Ok((prev + 1).to_be_bytes().to_vec())
        }

        fn detect_changes(&self, prev_emitted: &[u8], state: &[u8], _head: &Block) -> Result<Vec<Action>, ComponentError> {
            let prev = u64::from_be_bytes(prev_emitted.try_into().unwrap());
            let now = u64::from_be_bytes(state.try_into().unwrap());
            if now > prev {
                Ok(vec![Action::RemoveAppointment { id: AppointmentId::from([now as u8; 32]) }])
            } else {
                Ok(vec![])
            }
        }

        async fn apply_action(&self, _action: Action) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    fn block(height: u64, hash: u8, parent: u8) -> Block {
        Block {
            hash: BlockHash::from([hash; 32]),
            height,
            parent_hash: BlockHash::from([parent; 32]),
            logs: vec![],
            transactions: vec![],
        }
    }

    async fn setup() -> (ReducerFramework, BlockCache) {
        let store = BlockItemStore::open_temporary().unwrap();
        let cache = BlockCache::new(store.clone(), 100, Duration::from_secs(1));
        let actions = ActionStore::open(&store).unwrap();
        let mut framework = ReducerFramework::new(store, cache.clone(), actions, Duration::from_secs(1));
        framework.register(Arc::new(CountingComponent));
        (framework, cache)
    }

    #[tokio::test]
    async fn advances_state_on_new_block_and_emits_on_new_head() {
        let (framework, cache) = setup().await;

        let b0 = block(0, 0, 255);
        cache.add_block(b0.clone()).await.unwrap();
        framework.on_new_block(b0.clone()).await.unwrap();
        cache.set_head(b0.hash).await.unwrap();
        framework.on_new_head(b0.clone()).await.unwrap();
        // No prevEmitted existed before this head, so no action fires yet.
        assert!(framework.action_store.get_actions("counter").is_empty());

        let b1 = block(1, 1, 0);
        cache.add_block(b1.clone()).await.unwrap();
        framework.on_new_block(b1.clone()).await.unwrap();
        cache.set_head(b1.hash).await.unwrap();
        framework.on_new_head(b1.clone()).await.unwrap();

        // State advanced from 0 -> 1 between the two heads, and the action
        // applies cleanly so it is removed from the store immediately.
        assert!(framework.action_store.get_actions("counter").is_empty());
    }

    #[tokio::test]
    async fn missing_anchor_state_at_head_is_fatal() {
        let (framework, cache) = setup().await;
        let b0 = block(0, 0, 255);
        cache.add_block(b0.clone()).await.unwrap();
        cache.set_head(b0.hash).await.unwrap();
        // Deliberately skip on_new_block: no anchor state was ever computed.
        let err = framework.on_new_head(b0).await.unwrap_err();
        assert!(matches!(err, ReducerError::MissingAnchorState { .. }));
    }
}
