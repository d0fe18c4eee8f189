//! # PathSync Protocol
//!
//! Wire types shared by the PathSync server and its desktop/CLI clients.
//!
//! This crate provides:
//! - Client identity types (`ClientId`, `ClientInfo`, credentials)
//! - Registration and authentication messages
//! - Typed sync path settings with an explicit merge (`SyncPathSettings::apply`)
//! - Reconciliation instructions (`PathInstructions`)
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire format
//!
//! Messages are JSON documents with camelCase keys. The fields `id`,
//! `remotePath`, `permissions`, `timestamp` and `lastSync` must round-trip
//! exactly between client and server.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod messages;
mod settings;
mod types;

pub use client::{
    AuthKind, AuthRequest, AuthResponse, ClientInfo, ClientType, Credentials,
    RegistrationRequest, RegistrationResponse, SessionCookie, SessionTokens, SyncClientSummary,
};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode, encode, CreatePathRequest, CreatePathResponse, PathInstructions, PathUpdate,
    SyncPath, SyncRequest, SyncResponse,
};
pub use settings::{
    ConflictMode, DiffMode, SchedulerUnit, SyncMode, SyncPathPatch, SyncPathSettings,
    SyncScheduler,
};
pub use types::{ClientId, FileId, PathId, ShareId, SpaceId, SpaceRootId, UserId};
