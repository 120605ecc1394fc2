//! Vault engine for SealPass.
//!
//! This module provides:
//! - The master key lifecycle: initialize, unlock, hydrate, lock
//! - Credential storage inside a single encrypted vault blob
//! - Master password rotation with an all-or-nothing commit
//! - Inactivity auto-lock
//! - Change events for an external sync worker
//!
//! # Architecture
//! [`VaultService`] is the facade. It sits between a front end and a
//! [`sealpass_storage::KvStore`], handling all encryption transparently.
//! Nothing in this crate performs network I/O.

pub mod autolock;
pub mod codec;
pub mod config;
pub mod events;
pub mod record;
pub mod rotation;
pub mod salt_store;
pub mod service;
pub mod session;
pub mod store;

pub use autolock::AutoLock;
pub use config::VaultConfig;
pub use events::{RemoteEntry, SyncEvent, SyncOutbox};
pub use record::{CredentialDraft, CredentialPatch, CredentialRecord, PlainCredential};
pub use rotation::{RotationCoordinator, RotationReport};
pub use salt_store::SaltStore;
pub use service::VaultService;
pub use session::{SessionManager, VaultSession, VaultStatus, WrappedKey};
pub use store::VaultStore;
