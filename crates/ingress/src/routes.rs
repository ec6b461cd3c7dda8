use crate::{
    auth::verify_auth_header,
    error::IngressError,
    types::{AppointmentReceipt, BackupRestoreResponse, SignedAppointmentRequest},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use pisa_crypto::{appointment_digest, personal_sign_hash, recover_signer, sign_digest, RecoverableSignature};
use pisa_primitives::{Address, AppointmentId, AppointmentMode};
use tracing::{debug, warn};

fn current_head_height(state: &AppState) -> Result<u64, IngressError> {
    let head = state.cache.head_opt().ok_or(IngressError::NoHead)?;
    let block = state.cache.get_block(head).ok_or(IngressError::NoHead)?;
    Ok(block.height)
}

fn validate_appointment(state: &AppState, appointment: &SignedAppointmentRequest) -> Result<(), IngressError> {
    if appointment.end_block <= appointment.start_block {
        return Err(IngressError::BadBlockWindow);
    }
    if appointment.topics.len() > 4 {
        return Err(IngressError::TooManyTopics(appointment.topics.len()));
    }
    if appointment.mode == AppointmentMode::Relay
        && (appointment.event_address != Address::ZERO || !appointment.topics.is_empty())
    {
        return Err(IngressError::IncoherentMode);
    }

    let head = current_head_height(state)?;
    let distance = head.abs_diff(appointment.start_block);
    if distance > state.start_block_window {
        return Err(IngressError::StartBlockOutOfWindow { start_block: appointment.start_block, head });
    }

    let digest = personal_sign_hash(appointment_digest(appointment, state.tower_contract));
    let signature =
        RecoverableSignature::from_bytes(&appointment.customer_sig).map_err(|_| IngressError::BadSignature)?;
    let recovered = recover_signer(digest, &signature).map_err(|_| IngressError::BadSignature)?;
    if recovered != appointment.customer_address {
        return Err(IngressError::BadSignature);
    }

    Ok(())
}

/// `POST /appointment` (§4.9, §6).
pub async fn post_appointment(
    State(state): State<AppState>,
    Json(appointment): Json<SignedAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentReceipt>), IngressError> {
    validate_appointment(&state, &appointment)?;

    state.appointments.accept(appointment.clone())?;
    metrics::counter!(pisa_metrics::INGRESS_APPOINTMENTS_TOTAL, 1, "outcome" => "accepted");

    let digest = personal_sign_hash(appointment_digest(&appointment, state.tower_contract));
    let watcher_signature = sign_digest(&state.tower_key, digest);
    debug!(customer = %appointment.customer_address, id = %appointment.id, "accepted appointment");

    Ok((
        StatusCode::OK,
        Json(AppointmentReceipt {
            appointment,
            watcher_signature: watcher_signature.as_bytes(),
            watcher_address: state.tower_address,
        }),
    ))
}

fn require_auth(state: &AppState, address: Address, headers: &HeaderMap) -> Result<(), IngressError> {
    let auth_block: u64 = headers
        .get("x-auth-block")
        .and_then(|v| v.to_str().ok())
        .ok_or(IngressError::BadAuthBlockHeader)?
        .parse()
        .map_err(|_| IngressError::BadAuthBlockHeader)?;
    let auth_sig =
        headers.get("x-auth-sig").and_then(|v| v.to_str().ok()).ok_or(IngressError::BadAuthSigHeader)?;

    let head = current_head_height(state)?;
    if head.saturating_sub(auth_block) > state.auth_block_window {
        return Err(IngressError::AuthBlockTooOld { auth_block, head });
    }

    verify_auth_header(address, auth_block, auth_sig)
}

/// `GET /appointment/customer/{address}` (§4.9, §6).
pub async fn list_appointments(
    State(state): State<AppState>,
    Path(address): Path<Address>,
    headers: HeaderMap,
) -> Result<Json<Vec<SignedAppointmentRequest>>, IngressError> {
    require_auth(&state, address, &headers)?;

    let appointments = state.appointments.list_by_customer(address);
    Ok(Json(appointments.iter().map(|a| a.as_ref().clone()).collect()))
}

/// `GET /appointment/customer/{addr}/backup/{id}` (SPEC_FULL.md §C, §6
/// "Backup shorthand"): restores a backup appointment's `data` field for a
/// customer who has lost it.
pub async fn get_backup(
    State(state): State<AppState>,
    Path((address, id)): Path<(Address, AppointmentId)>,
    headers: HeaderMap,
) -> Result<Json<BackupRestoreResponse>, IngressError> {
    require_auth(&state, address, &headers)?;

    let appointment = state.appointments.get(address, id).ok_or(IngressError::NotFound)?;
    if !appointment.is_backup() {
        warn!(customer = %address, id = %id, "restore requested for a non-backup appointment");
        return Err(IngressError::NotABackup);
    }

    Ok(Json(BackupRestoreResponse { id, nonce: appointment.nonce, data: appointment.calldata.clone() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_state, tower_keys};
    use axum::http::{HeaderValue, StatusCode as SC};
    use pisa_crypto::appointment_digest as digest_fn;
    use pisa_primitives::{Bytes, B256, U256};

    fn signed_appointment(
        state: &AppState,
        customer_key: &secp256k1::SecretKey,
        customer_address: Address,
        start_block: u64,
    ) -> SignedAppointmentRequest {
        let mut appointment = SignedAppointmentRequest {
            customer_address,
            id: AppointmentId::from([1u8; 32]),
            nonce: 0,
            start_block,
            end_block: start_block + 100,
            contract_address: Address::from([2u8; 20]),
            calldata: Bytes::from_static(&[0xab]),
            gas_limit: 21_000,
            challenge_period: 100,
            refund: U256::ZERO,
            pre_condition: Bytes::new(),
            post_condition: Bytes::new(),
            payment_hash: B256::ZERO,
            mode: AppointmentMode::Relay,
            event_address: Address::ZERO,
            topics: vec![],
            customer_sig: Bytes::new(),
        };
        let digest = personal_sign_hash(digest_fn(&appointment, state.tower_contract));
        let sig = sign_digest(customer_key, digest);
        appointment.customer_sig = sig.as_bytes();
        appointment
    }

    #[tokio::test]
    async fn accepts_a_correctly_signed_relay_appointment() {
        let (state, _store) = test_state(10).await;
        let (secret_key, customer_address) = tower_keys();
        let appointment = signed_appointment(&state, &secret_key, customer_address, 10);

        let (status, Json(receipt)) = post_appointment(State(state.clone()), Json(appointment.clone()))
            .await
            .unwrap();
        assert_eq!(status, SC::OK);
        assert_eq!(receipt.appointment.id, appointment.id);
        assert_eq!(receipt.watcher_address, state.tower_address);
    }

    #[tokio::test]
    async fn rejects_a_tampered_appointment() {
        let (state, _store) = test_state(10).await;
        let (secret_key, customer_address) = tower_keys();
        let mut appointment = signed_appointment(&state, &secret_key, customer_address, 10);
        appointment.gas_limit += 1;

        let err = post_appointment(State(state), Json(appointment)).await.unwrap_err();
        assert!(matches!(err, IngressError::BadSignature));
    }

    #[tokio::test]
    async fn rejects_a_start_block_far_from_head() {
        let (state, _store) = test_state(10).await;
        let (secret_key, customer_address) = tower_keys();
        let appointment = signed_appointment(&state, &secret_key, customer_address, 500);

        let err = post_appointment(State(state), Json(appointment)).await.unwrap_err();
        assert!(matches!(err, IngressError::StartBlockOutOfWindow { .. }));
    }

    #[tokio::test]
    async fn second_acceptance_with_equal_nonce_conflicts() {
        let (state, _store) = test_state(10).await;
        let (secret_key, customer_address) = tower_keys();
        let appointment = signed_appointment(&state, &secret_key, customer_address, 10);
        post_appointment(State(state.clone()), Json(appointment.clone())).await.unwrap();

        let err = post_appointment(State(state), Json(appointment)).await.unwrap_err();
        assert!(matches!(
            err,
            IngressError::AppointmentStore(pisa_appointment_store::AppointmentStoreError::StaleNonce { .. })
        ));
    }

    #[tokio::test]
    async fn list_requires_a_valid_auth_header() {
        let (state, _store) = test_state(10).await;
        let (secret_key, customer_address) = tower_keys();
        let appointment = signed_appointment(&state, &secret_key, customer_address, 10);
        post_appointment(State(state.clone()), Json(appointment)).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-auth-block", HeaderValue::from_static("10"));
        let digest = crate::auth::auth_block_digest(10);
        let sig = sign_digest(&secret_key, digest);
        headers.insert("x-auth-sig", HeaderValue::from_str(&hex::encode(sig.0)).unwrap());

        let Json(appointments) =
            list_appointments(State(state), Path(customer_address), headers).await.unwrap();
        assert_eq!(appointments.len(), 1);
    }

    #[tokio::test]
    async fn backup_restore_returns_the_data_field() {
        let (state, _store) = test_state(10).await;
        let (secret_key, _) = tower_keys();
        let customer_address = Address::from([3u8; 20]);
        let mut appointment = signed_appointment(&state, &secret_key, customer_address, 10);
        appointment.contract_address = customer_address;
        appointment.event_address = customer_address;
        appointment.customer_address = customer_address;
        let digest = personal_sign_hash(digest_fn(&appointment, state.tower_contract));
        appointment.customer_sig = sign_digest(&secret_key, digest).as_bytes();
        state.appointments.accept(appointment.clone()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-auth-block", HeaderValue::from_static("10"));
        let auth_digest = crate::auth::auth_block_digest(10);
        let sig = sign_digest(&secret_key, auth_digest);
        headers.insert("x-auth-sig", HeaderValue::from_str(&hex::encode(sig.0)).unwrap());

        let Json(restored) =
            get_backup(State(state), Path((customer_address, appointment.id)), headers).await.unwrap();
        assert_eq!(restored.data, appointment.calldata);
    }
}
