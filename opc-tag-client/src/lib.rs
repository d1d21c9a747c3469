//! # opc-tag-client
//!
//! Tag-oriented client core for an OPC DA style data provider.
//!
//! Callers work with groups and tag names; the crate keeps the provider
//! handle bookkeeping, reads a whole group per round trip, and reports
//! per-item status alongside the values.
//!
//! ## Features
//! - `simulator` (default): Enables the in-memory `SimulatedProvider`
//! - `test-support`: Enables `MockProviderConnection` and `MockTagService` via `mockall`

mod batch;
mod client;
mod config;
mod error;
mod helpers;
mod items;
mod provider;
mod registry;
mod worker;

pub mod backend;

// Stable public API
pub use batch::{BatchReadEngine, ReadResult, TagValue, WriteResult};
pub use client::{GroupRef, ItemLocation, TagClient};
pub use config::{ClientConfig, DEFAULT_CONNECTION_ID, GroupAddressing};
pub use error::{
    E_INVALIDARG, OPC_E_BADRIGHTS, OPC_E_BADTYPE, OPC_E_INVALIDHANDLE, OPC_E_INVALIDITEMID,
    OPC_E_UNKNOWNITEMID, S_OK, TagError, TagResult, format_error_code, friendly_code_hint,
    friendly_error_hint,
};
pub use helpers::{
    is_good_quality, parse_opc_value, quality_to_string, timestamp_to_string, value_to_string,
    value_to_text,
};
pub use items::{Item, ItemIndex};
pub use provider::{
    BatchReadReply, GroupHandle, ItemHandle, ItemReading, OneBasedArray, OpcValue,
    ProviderConnection, ServerState,
};
pub use registry::{Group, GroupId, GroupRegistry};
pub use worker::{TagRequest, TagService, TagWorker};

// Backend re-exports (conditional)
#[cfg(feature = "simulator")]
pub use backend::simulated::SimulatedProvider;

// Test support re-export
#[cfg(feature = "test-support")]
pub use provider::MockProviderConnection;
#[cfg(feature = "test-support")]
pub use worker::MockTagService;
