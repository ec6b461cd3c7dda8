//! The action store (§4.7): a durable FIFO set of pending side-effects, one
//! queue per component name.
//!
//! Every action the reducer framework's `detectChanges` produces is
//! persisted here before anything ever tries to apply it, so a crash
//! between "detected" and "applied" never silently drops a side-effect
//! (§7 "`applyAction` failures do not remove the action, so it will be
//! retried on the next head").

mod error;

pub use error::ActionStoreError;

use parking_lot::Mutex;
use pisa_primitives::{Action, ActionId, ActionPayload};
use pisa_store::BlockItemStore;
use std::collections::HashMap;
use tracing::trace;
use uuid::Uuid;

const NAMESPACE: &str = "action-store";

fn make_key(name: &str, id: Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1 + 36);
    key.extend_from_slice(name.as_bytes());
    key.push(b':');
    key.extend_from_slice(id.to_string().as_bytes());
    key
}

fn split_key(key: &[u8]) -> Option<(String, Uuid)> {
    let text = std::str::from_utf8(key).ok()?;
    let (name, id_str) = text.rsplit_once(':')?;
    let id = Uuid::parse_str(id_str).ok()?;
    Some((name.to_string(), id))
}

/// The durable, per-component action queue (§4.7).
///
/// Cheap to clone: every clone shares the same underlying `sled` tree and
/// in-memory view.
#[derive(Clone)]
pub struct ActionStore {
    tree: sled::Tree,
    /// The in-memory view `getActions` reads from; reloaded from disk once
    /// at construction and kept in lockstep with every
    /// `storeActions`/`removeAction` call thereafter (§4.7 "`getActions`
    /// returns the current in-memory view reloaded from disk at startup").
    queues: std::sync::Arc<Mutex<HashMap<String, Vec<ActionPayload>>>>,
}

impl std::fmt::Debug for ActionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queues = self.queues.lock();
        f.debug_struct("ActionStore").field("components", &queues.len()).finish()
    }
}

impl ActionStore {
    /// Opens the action store's sibling namespace in `store`'s underlying
    /// database (§6 "Persisted layout": `action-store/`), reloading
    /// whatever was persisted from a prior run.
    pub fn open(store: &BlockItemStore) -> Result<Self, ActionStoreError> {
        let tree = store.open_namespace(NAMESPACE)?;
        let mut queues: HashMap<String, Vec<ActionPayload>> = HashMap::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            let Some((name, id)) = split_key(&key) else { continue };
            let action: Action = postcard::from_bytes(&value)?;
            queues.entry(name).or_default().push((id, action));
        }
        Ok(Self { tree, queues: std::sync::Arc::new(Mutex::new(queues)) })
    }

    /// Assigns each of `actions` a fresh [`ActionId`], persists them under
    /// `name`, and returns the assigned `(id, action)` pairs (§4.7
    /// `storeActions`).
    pub fn store_actions(&self, name: &str, actions: Vec<Action>) -> Result<Vec<ActionPayload>, ActionStoreError> {
        let mut assigned = Vec::with_capacity(actions.len());
        for action in actions {
            let id = Uuid::new_v4();
            let bytes = postcard::to_allocvec(&action)?;
            self.tree.insert(make_key(name, id), bytes)?;
            assigned.push((id, action));
        }

        if !assigned.is_empty() {
            let mut queues = self.queues.lock();
            let queue = queues.entry(name.to_string()).or_default();
            queue.extend(assigned.iter().cloned());
            metrics::gauge!(pisa_metrics::ACTIONS_PENDING, queue.len() as f64);
            trace!(component = name, stored = assigned.len(), "persisted actions");
        }

        Ok(assigned)
    }

    /// Returns every currently-outstanding action for `name`, in the order
    /// they were stored (§4.7 `getActions`).
    pub fn get_actions(&self, name: &str) -> Vec<ActionPayload> {
        self.queues.lock().get(name).cloned().unwrap_or_default()
    }

    /// Deletes the persisted entry for `(name, id)` and removes it from the
    /// in-memory view (§4.7 `removeAction`). A no-op if the id is not
    /// present, so callers that race to remove the same action never error.
    pub fn remove_action(&self, name: &str, id: ActionId) -> Result<(), ActionStoreError> {
        self.tree.remove(make_key(name, id))?;

        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get_mut(name) {
            queue.retain(|(existing_id, _)| *existing_id != id);
            metrics::gauge!(pisa_metrics::ACTIONS_PENDING, queue.len() as f64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pisa_primitives::AppointmentId;

    fn remove_action(id: AppointmentId) -> Action {
        Action::RemoveAppointment { id }
    }

    #[test]
    fn store_then_get_round_trips() {
        let store = BlockItemStore::open_temporary().unwrap();
        let actions = ActionStore::open(&store).unwrap();

        let assigned = actions
            .store_actions("watcher", vec![remove_action(AppointmentId::from([1u8; 32]))])
            .unwrap();
        assert_eq!(assigned.len(), 1);

        let got = actions.get_actions("watcher");
        assert_eq!(got, assigned);
    }

    #[test]
    fn remove_deletes_from_memory_and_disk() {
        let store = BlockItemStore::open_temporary().unwrap();
        let actions = ActionStore::open(&store).unwrap();

        let assigned = actions
            .store_actions("watcher", vec![remove_action(AppointmentId::from([2u8; 32]))])
            .unwrap();
        let (id, _) = assigned[0].clone();

        actions.remove_action("watcher", id).unwrap();
        assert!(actions.get_actions("watcher").is_empty());

        // Reopening from the same underlying store must also see it gone.
        let reopened = ActionStore::open(&store).unwrap();
        assert!(reopened.get_actions("watcher").is_empty());
    }

    #[test]
    fn reload_recovers_persisted_actions() {
        let store = BlockItemStore::open_temporary().unwrap();
        {
            let actions = ActionStore::open(&store).unwrap();
            actions
                .store_actions("watcher", vec![remove_action(AppointmentId::from([3u8; 32]))])
                .unwrap();
        }

        let reopened = ActionStore::open(&store).unwrap();
        assert_eq!(reopened.get_actions("watcher").len(), 1);
    }

    #[test]
    fn queues_are_independent_per_component() {
        let store = BlockItemStore::open_temporary().unwrap();
        let actions = ActionStore::open(&store).unwrap();

        actions.store_actions("watcher", vec![remove_action(AppointmentId::from([4u8; 32]))]).unwrap();
        actions.store_actions("responder", vec![remove_action(AppointmentId::from([5u8; 32]))]).unwrap();

        assert_eq!(actions.get_actions("watcher").len(), 1);
        assert_eq!(actions.get_actions("responder").len(), 1);
    }
}
