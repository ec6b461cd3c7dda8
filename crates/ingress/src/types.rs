use pisa_primitives::{Address, Appointment, AppointmentId, Bytes};
use serde::{Deserialize, Serialize};

/// The body of `POST /appointment` (§4.9, §6 "HTTP surface"). Identical in
/// shape to [`Appointment`] - the request already carries `customer_sig` -
/// kept as a distinct alias so the route signature reads the way §4.9's
/// prose does.
pub type SignedAppointmentRequest = Appointment;

/// One entry of `GET /appointment/customer/{address}`'s response array
/// (§6): again, the stored `Appointment` itself.
pub type AppointmentRequest = Appointment;

/// The response to a successfully accepted appointment (§4.9): the
/// appointment as stored, plus the tower's countersignature over the same
/// digest the customer signed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppointmentReceipt {
    pub appointment: Appointment,
    pub watcher_signature: Bytes,
    pub watcher_address: Address,
}

/// The response to `GET /appointment/customer/{addr}/backup/{id}` (§6
/// "Backup shorthand", SPEC_FULL.md §C): the backup appointment's `data`
/// field, tagged with the `(id, nonce)` pair it was restored from so a
/// caller holding several generations of the same backup id can tell them
/// apart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupRestoreResponse {
    pub id: AppointmentId,
    pub nonce: u64,
    pub data: Bytes,
}
