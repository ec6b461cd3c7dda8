//! Core types shared by every PISA watchtower crate.
//!
//! Mirrors `reth-primitives` in spirit: small, dependency-light value types
//! with no business logic attached. Components reach into this crate for
//! [`Block`], [`Log`], [`Appointment`] and the anchor-state/action types that
//! flow between the reducer framework and its components.

mod block;
mod transaction;
mod log;
mod appointment;
mod anchor_state;
mod action;
mod filter;
mod event;

pub use action::{Action, ActionId, ActionPayload};
pub use anchor_state::{PendingTransactionAnchor, ResponderAnchorState, TransactionStatus, WatcherState};
pub use appointment::{Appointment, AppointmentId, AppointmentMode, CustomerAddress};
pub use block::{Block, BlockHash};
pub use event::{Event, ListenerId};
pub use filter::{EventFilter, LogFilterMatch};
pub use log::{logs_bloom_addresses, Log};
pub use transaction::Transaction;

/// Re-exported so downstream crates never need to depend on `alloy-primitives` directly
/// for the handful of scalar types PISA passes around.
pub use alloy_primitives::{Address, Bytes, B256, U256};

/// Block height. Always non-negative; represented as `u64` the way reth
/// represents `BlockNumber`.
pub type BlockHeight = u64;
