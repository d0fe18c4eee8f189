//! # PathSync Server
//!
//! Server core for desktop and CLI sync clients.
//!
//! This crate provides:
//! - A client registry: registration, authentication, token rotation and
//!   revocation of per-device sync clients
//! - A path reconciler: sync path CRUD and the bidirectional reconciliation
//!   pass that returns `{add, update, delete}` instructions
//! - Gateway traits for the collaborators the core relies on (client and path
//!   rows, space/permission oracle, account directory, session issuer,
//!   notifications) and in-memory implementations of each
//!
//! # Tokens
//!
//! Client tokens are opaque random secrets valid for a fixed window
//! (120 days by default). A successful authentication with less than the
//! renewal window left (60 days by default) rotates the token and returns
//! the new one as `clientTokenUpdate`.
//!
//! # Reconciliation
//!
//! The client posts its full snapshot of sync paths. For every id known to
//! either side the server decides, from the logical `timestamp` of both
//! copies and the current oracle resolution, what it stores and what the
//! client must add, update or delete. See [`plan`].
//!
//! ```rust
//! use pathsync_server::{MemoryGateways, ServerConfig, SyncServer};
//!
//! let gateways = MemoryGateways::new();
//! let config = ServerConfig::default().with_inline_background(true);
//! let server = SyncServer::new(config, gateways.gateways()).unwrap();
//! assert_eq!(server.config().max_reconcile_paths, 1000);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod background;
mod config;
mod context;
mod error;
mod gateway;
pub mod memory;
pub mod plan;
mod reconciler;
mod registry;
mod server;
mod tokens;

pub use background::BackgroundTasks;
pub use config::ServerConfig;
pub use context::{Caller, Gateways, HandlerContext};
pub use error::{GatewayError, GatewayResult, ServerError, ServerResult};
pub use gateway::{
    AccountDirectory, ClientStore, CredentialIssuer, NewSyncClient, NewSyncPath, NotificationSink,
    PathBinding, PathRemovedNotice, PathStore, RemovalReason, ResolvedRemote, SettingsCache,
    SpaceEnv, SpaceLocation, SpaceOracle, SyncClientRecord, SyncPathRecord, SyncUser,
};
pub use memory::MemoryGateways;
pub use reconciler::PathReconciler;
pub use registry::{AuthOutcome, ClientRegistry};
pub use server::{RequestContext, SyncServer};
pub use tokens::{
    generate_token, next_logical_timestamp, unix_now, unix_now_millis, TokenPolicy, TokenStatus,
    TOKEN_LENGTH,
};
