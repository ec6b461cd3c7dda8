//! The ingress surface (§4.9, §6 "HTTP surface"): the one part of PISA a
//! customer talks to directly. Verifies signed appointment requests,
//! countersigns accepted ones into a receipt, and hands the appointment to
//! [`pisa_appointment_store::AppointmentStore`] - the watcher picks it up
//! from there on the next block (§3 "Ownership: the appointment store owns
//! appointments; the watcher reads").
//!
//! Built on `axum`, the way `aptos-core`'s `api` crate serves its REST
//! surface; composes with the rest of the teacher's `tower`/`tower-http`
//! stack for tracing and timeout middleware.

mod auth;
mod error;
mod routes;
mod test_support;
mod types;

pub use error::IngressError;
pub use types::{AppointmentReceipt, AppointmentRequest, BackupRestoreResponse, SignedAppointmentRequest};

use axum::{
    routing::{get, post},
    Router,
};
use pisa_appointment_store::AppointmentStore;
use pisa_block_cache::BlockCache;
use pisa_primitives::Address;
use secp256k1::SecretKey;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// Shared state handed to every route handler; cheap to clone (every field
/// is itself a handle - `AppointmentStore` and `BlockCache` already clone
/// via `Arc`-backed internals, per their own crates).
#[derive(Clone)]
pub struct AppState {
    pub(crate) appointments: AppointmentStore,
    pub(crate) cache: BlockCache,
    /// The tower's own signing key, used to countersign accepted
    /// appointments (§4.9 "Issues a receipt"). Distinct from the
    /// responder's wallet key (§1: the signing API is a separate external
    /// collaborator).
    pub(crate) tower_key: SecretKey,
    pub(crate) tower_address: Address,
    /// The tower's on-chain contract address, concatenated into every
    /// appointment digest (§6 "Appointment digest").
    pub(crate) tower_contract: Address,
    pub(crate) start_block_window: u64,
    pub(crate) auth_block_window: u64,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("tower_address", &self.tower_address).finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        appointments: AppointmentStore,
        cache: BlockCache,
        tower_key: SecretKey,
        tower_address: Address,
        tower_contract: Address,
        start_block_window: u64,
        auth_block_window: u64,
    ) -> Self {
        Self { appointments, cache, tower_key, tower_address, tower_contract, start_block_window, auth_block_window }
    }
}

/// Builds the route table (§6 "HTTP surface"). Split out from [`serve`] so
/// integration tests can exercise the router directly with `tower::Service`
/// rather than binding a real socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/appointment", post(routes::post_appointment))
        .route("/appointment/customer/{address}", get(routes::list_appointments))
        .route("/appointment/customer/{address}/backup/{id}", get(routes::get_backup))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

/// Binds `bind_address` and serves the ingress router until `shutdown`
/// resolves, mirroring the rest of the workspace's "long-running component
/// exposes an async `run`, `pisa-node` spawns it via `pisa-tasks`" shape
/// (§5 "Cancellation": `stop` lets in-flight handlers finish before
/// returning).
pub async fn serve(
    state: AppState,
    bind_address: &str,
    shutdown: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(bind_address).await?;
    info!(%bind_address, "ingress surface listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(async {
        let _ = shutdown.await;
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_state, tower_keys};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn unknown_route_is_a_404() {
        let (state, _store) = test_state(10).await;
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_appointment_body_is_rejected() {
        let (state, _store) = test_state(10).await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/appointment")
                    .header("content-type", "application/json")
                    .body(Body::from("not json at all"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn tower_keys_produces_distinct_addresses() {
        let (_, a) = tower_keys();
        let (_, b) = tower_keys();
        assert_ne!(a, b);
    }
}
