//! The appointment store (§4.8): a durable mapping `(customerAddress, id) ->
//! Appointment`, plus an index `id -> Appointment` for the watcher, which
//! only ever looks appointments up by their customer-chosen `id` (§3
//! "Ownership: the appointment store owns appointments; the watcher
//! reads").
//!
//! Acceptance enforces §3's replacement rule: a new appointment for an
//! `(customer, id)` pair is only accepted if no existing entry carries an
//! equal or greater `nonce`; replacement is an atomic delete-and-put (§4.8).

mod error;

pub use error::AppointmentStoreError;

use parking_lot::Mutex;
use pisa_primitives::{Appointment, AppointmentId, CustomerAddress};
use pisa_store::BlockItemStore;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

const NAMESPACE: &str = "appointment-store";

fn make_key(customer: CustomerAddress, id: AppointmentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(20 + 32);
    key.extend_from_slice(customer.as_slice());
    key.extend_from_slice(id.as_slice());
    key
}

fn split_key(key: &[u8]) -> Option<(CustomerAddress, AppointmentId)> {
    if key.len() != 52 {
        return None;
    }
    Some((CustomerAddress::from_slice(&key[..20]), AppointmentId::from_slice(&key[20..])))
}

#[derive(Default)]
struct Index {
    /// Primary map, mirrors the sled tree (§3 "a durable mapping
    /// `(customerAddress, id) -> Appointment`").
    by_identity: HashMap<(CustomerAddress, AppointmentId), Arc<Appointment>>,
    /// §3's "index `id -> Appointment` for the watcher": the watcher never
    /// knows (or cares about) the owning customer address, only the
    /// appointment `id` it was asked to watch.
    by_id: HashMap<AppointmentId, Arc<Appointment>>,
}

impl Index {
    fn insert(&mut self, appointment: Appointment) {
        let identity = appointment.identity();
        let shared = Arc::new(appointment);
        self.by_identity.insert(identity, shared.clone());
        self.by_id.insert(identity.1, shared);
    }

    fn remove_by_id(&mut self, id: AppointmentId) -> Option<Arc<Appointment>> {
        let removed = self.by_id.remove(&id)?;
        self.by_identity.remove(&removed.identity());
        Some(removed)
    }
}

/// The appointment store (§4.8).
///
/// Cheap to clone: every clone shares the same underlying `sled` tree and
/// in-memory index.
#[derive(Clone)]
pub struct AppointmentStore {
    tree: sled::Tree,
    index: Arc<Mutex<Index>>,
}

impl std::fmt::Debug for AppointmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.index.lock();
        f.debug_struct("AppointmentStore").field("count", &index.by_id.len()).finish()
    }
}

impl AppointmentStore {
    /// Opens the appointment store's sibling namespace in `store`'s
    /// underlying database (§6 "Persisted layout": `appointment-store/`),
    /// reloading whatever was persisted from a prior run.
    pub fn open(store: &BlockItemStore) -> Result<Self, AppointmentStoreError> {
        let tree = store.open_namespace(NAMESPACE)?;
        let mut index = Index::default();
        for entry in tree.iter() {
            let (_, value) = entry?;
            let appointment: Appointment = postcard::from_bytes(&value)?;
            index.insert(appointment);
        }
        metrics::gauge!(pisa_metrics::APPOINTMENTS_ACTIVE, index.by_id.len() as f64);
        Ok(Self { tree, index: Arc::new(Mutex::new(index)) })
    }

    /// Accepts `appointment` (§4.8, §4.9 "POST /appointment"). Rejected with
    /// [`AppointmentStoreError::StaleNonce`] if a prior entry for the same
    /// `(customer, id)` carries an equal or greater `nonce`; otherwise the
    /// prior entry (if any) is atomically replaced.
    pub fn accept(&self, appointment: Appointment) -> Result<(), AppointmentStoreError> {
        let identity = appointment.identity();
        let mut index = self.index.lock();

        if let Some(existing) = index.by_identity.get(&identity) {
            if existing.nonce >= appointment.nonce {
                return Err(AppointmentStoreError::StaleNonce { existing: existing.nonce, incoming: appointment.nonce });
            }
        }

        let key = make_key(identity.0, identity.1);
        let bytes = postcard::to_allocvec(&appointment)?;
        self.tree.insert(key, bytes)?;

        index.insert(appointment);
        metrics::gauge!(pisa_metrics::APPOINTMENTS_ACTIVE, index.by_id.len() as f64);
        debug!(customer = %identity.0, id = %identity.1, "accepted appointment");
        Ok(())
    }

    /// Looks an appointment up by its `(customer, id)` identity.
    pub fn get(&self, customer: CustomerAddress, id: AppointmentId) -> Option<Arc<Appointment>> {
        self.index.lock().by_identity.get(&(customer, id)).cloned()
    }

    /// Looks an appointment up by `id` alone, the way the watcher does
    /// (§3 "an index `id -> Appointment` for the watcher").
    pub fn get_by_id(&self, id: AppointmentId) -> Option<Arc<Appointment>> {
        self.index.lock().by_id.get(&id).cloned()
    }

    /// Every appointment currently belonging to `customer`, for
    /// `GET /appointment/customer/{address}` (§4.9, §6).
    pub fn list_by_customer(&self, customer: CustomerAddress) -> Vec<Arc<Appointment>> {
        self.index
            .lock()
            .by_identity
            .iter()
            .filter(|((c, _), _)| *c == customer)
            .map(|(_, appointment)| appointment.clone())
            .collect()
    }

    /// Every currently-held appointment, for the watcher's per-block scan
    /// (§4.5 `getInitialState`/`reduce`).
    pub fn all(&self) -> Vec<Arc<Appointment>> {
        self.index.lock().by_id.values().cloned().collect()
    }

    /// Deletes the appointment identified by `id` (§4.5 `applyAction
    /// (RemoveAppointment)`, §4.8). A no-op if `id` is not present, so
    /// callers that race to remove the same appointment never error
    /// (idempotent, per §4.4 "Side effects must therefore be idempotent").
    pub fn remove(&self, id: AppointmentId) -> Result<(), AppointmentStoreError> {
        let mut index = self.index.lock();
        let Some(removed) = index.remove_by_id(id) else { return Ok(()) };
        self.tree.remove(make_key(removed.customer_address, id))?;
        metrics::gauge!(pisa_metrics::APPOINTMENTS_ACTIVE, index.by_id.len() as f64);
        debug!(id = %id, "removed appointment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pisa_primitives::{Address, AppointmentMode, Bytes, B256, U256};

    fn appointment(customer: u8, id: u8, nonce: u64) -> Appointment {
        Appointment {
            customer_address: Address::from([customer; 20]),
            id: AppointmentId::from([id; 32]),
            nonce,
            start_block: 0,
            end_block: 100,
            contract_address: Address::ZERO,
            calldata: Bytes::new(),
            gas_limit: 21000,
            challenge_period: 100,
            refund: U256::ZERO,
            pre_condition: Bytes::new(),
            post_condition: Bytes::new(),
            payment_hash: B256::ZERO,
            mode: AppointmentMode::Relay,
            event_address: Address::ZERO,
            topics: vec![],
            customer_sig: Bytes::new(),
        }
    }

    #[test]
    fn accept_then_lookup_by_identity_and_id() {
        let store = BlockItemStore::open_temporary().unwrap();
        let appointments = AppointmentStore::open(&store).unwrap();
        let a = appointment(1, 1, 0);
        appointments.accept(a.clone()).unwrap();

        assert_eq!(appointments.get(a.customer_address, a.id).unwrap().nonce, 0);
        assert_eq!(appointments.get_by_id(a.id).unwrap().nonce, 0);
    }

    #[test]
    fn replacement_requires_strictly_greater_nonce() {
        let store = BlockItemStore::open_temporary().unwrap();
        let appointments = AppointmentStore::open(&store).unwrap();
        let a0 = appointment(1, 1, 5);
        appointments.accept(a0.clone()).unwrap();

        let stale = appointment(1, 1, 5);
        assert_matches!(appointments.accept(stale).unwrap_err(), AppointmentStoreError::StaleNonce { .. });

        let mut replacement = appointment(1, 1, 6);
        replacement.end_block = 200;
        appointments.accept(replacement).unwrap();
        assert_eq!(appointments.get(a0.customer_address, a0.id).unwrap().end_block, 200);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = BlockItemStore::open_temporary().unwrap();
        let appointments = AppointmentStore::open(&store).unwrap();
        let a = appointment(2, 2, 0);
        appointments.accept(a.clone()).unwrap();

        appointments.remove(a.id).unwrap();
        assert!(appointments.get_by_id(a.id).is_none());
        // Removing again is a no-op, not an error.
        appointments.remove(a.id).unwrap();
    }

    #[test]
    fn reload_recovers_persisted_appointments() {
        let store = BlockItemStore::open_temporary().unwrap();
        let a = appointment(3, 3, 0);
        {
            let appointments = AppointmentStore::open(&store).unwrap();
            appointments.accept(a.clone()).unwrap();
        }

        let reopened = AppointmentStore::open(&store).unwrap();
        assert_eq!(reopened.get_by_id(a.id).unwrap().nonce, 0);
    }

    #[test]
    fn list_by_customer_filters_other_customers() {
        let store = BlockItemStore::open_temporary().unwrap();
        let appointments = AppointmentStore::open(&store).unwrap();
        appointments.accept(appointment(1, 1, 0)).unwrap();
        appointments.accept(appointment(1, 2, 0)).unwrap();
        appointments.accept(appointment(9, 3, 0)).unwrap();

        let mine = appointments.list_by_customer(Address::from([1u8; 20]));
        assert_eq!(mine.len(), 2);
    }
}
