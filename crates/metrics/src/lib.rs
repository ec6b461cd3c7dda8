//! Metric names and a single `describe_all` registration entry point,
//! modeled on `reth-metrics`/`reth-metrics-derive`: call sites use the
//! `metrics` facade macros directly (`counter!`, `gauge!`), and this crate
//! only centralizes the string constants and up-front `describe_*` calls so
//! dashboards see consistent help text regardless of which component fires
//! first.

/// Number of blocks currently held by the block cache (attached + detached).
pub const CACHE_SIZE: &str = "pisa_cache_size";
/// Height of the block cache's current head.
pub const CACHE_HEAD_HEIGHT: &str = "pisa_cache_head_height";
/// Number of outstanding (not-yet-applied) actions, per component.
pub const ACTIONS_PENDING: &str = "pisa_actions_pending";
/// Number of rows in the multi-responder's pending-transaction table.
pub const RESPONDER_PENDING_TRANSACTIONS: &str = "pisa_responder_pending_transactions";
/// Count of broadcast attempts that were retried after a transient failure.
pub const RESPONDER_BROADCAST_RETRIES: &str = "pisa_responder_broadcast_retries_total";
/// Count of gas-price bumps issued by the multi-responder's reducer.
pub const RESPONDER_GAS_BUMPS: &str = "pisa_responder_gas_bumps_total";
/// Number of appointments currently held by the appointment store.
pub const APPOINTMENTS_ACTIVE: &str = "pisa_appointments_active";
/// Count of `POST /appointment` requests, labeled by outcome.
pub const INGRESS_APPOINTMENTS_TOTAL: &str = "pisa_ingress_appointments_total";

/// Registers descriptions for every metric this crate names, so the first
/// `counter!`/`gauge!` call for a name isn't also the first time its help
/// text is set. Call once at start-up.
pub fn describe_all() {
    metrics::describe_gauge!(CACHE_SIZE, "Blocks currently held by the block cache");
    metrics::describe_gauge!(CACHE_HEAD_HEIGHT, "Height of the block cache's current head");
    metrics::describe_gauge!(ACTIONS_PENDING, "Outstanding actions not yet applied, per component");
    metrics::describe_gauge!(
        RESPONDER_PENDING_TRANSACTIONS,
        "Rows in the multi-responder's pending-transaction table"
    );
    metrics::describe_counter!(RESPONDER_BROADCAST_RETRIES, "Broadcast attempts retried after transient failure");
    metrics::describe_counter!(RESPONDER_GAS_BUMPS, "Gas-price bumps issued by the multi-responder");
    metrics::describe_gauge!(APPOINTMENTS_ACTIVE, "Appointments currently held by the appointment store");
    metrics::describe_counter!(INGRESS_APPOINTMENTS_TOTAL, "POST /appointment requests, labeled by outcome");
}
