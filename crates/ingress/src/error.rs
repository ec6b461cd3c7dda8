use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;

/// Errors surfaced by the HTTP surface (§4.9, §7 "Validation").
///
/// Every variant maps to a fixed HTTP status via [`IntoResponse`]; none of
/// these are retried by the caller (§7: "Surfaced to the caller; not
/// retried").
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("signature does not recover to the claimed address")]
    BadSignature,
    #[error("startBlock {start_block} is outside the acceptable window of head {head}")]
    StartBlockOutOfWindow { start_block: u64, head: u64 },
    #[error("endBlock must be strictly greater than startBlock")]
    BadBlockWindow,
    #[error("at most 4 topics are accepted, got {0}")]
    TooManyTopics(usize),
    #[error("relay-mode appointments must carry the zero-address/empty-topics filter")]
    IncoherentMode,
    #[error("appointment store error: {0}")]
    AppointmentStore(#[from] pisa_appointment_store::AppointmentStoreError),
    #[error("no appointment found for that customer and id")]
    NotFound,
    #[error("appointment is not a backup")]
    NotABackup,
    #[error("x-auth-block header is missing or malformed")]
    BadAuthBlockHeader,
    #[error("x-auth-sig header is missing or malformed")]
    BadAuthSigHeader,
    #[error("x-auth-block {auth_block} is older than the acceptable window of head {head}")]
    AuthBlockTooOld { auth_block: u64, head: u64 },
    #[error("x-auth-sig does not recover to the requested customer address")]
    AuthSignatureMismatch,
    #[error("block cache has no head yet")]
    NoHead,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::AppointmentStore(pisa_appointment_store::AppointmentStoreError::StaleNonce { .. }) => {
                StatusCode::CONFLICT
            }
            Self::AuthSignatureMismatch => StatusCode::UNAUTHORIZED,
            Self::NotFound | Self::NotABackup => StatusCode::NOT_FOUND,
            Self::NoHead => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
