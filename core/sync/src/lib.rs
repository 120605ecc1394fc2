//! Remote synchronization for SealPass.
//!
//! This module provides:
//! - The [`RemoteVault`] contract and its REST implementation
//! - Retry strategy with exponential backoff
//! - A worker that drains the vault's sync outbox and pulls the remote copy
//! - Persisted authentication state and remote id mapping
//!
//! Only ciphertext and the master salt are ever sent.

pub mod auth;
pub mod client;
pub mod config;
pub mod index;
pub mod retry;
pub mod worker;

pub use auth::{AuthState, User};
pub use client::{HttpRemoteVault, RemoteRecord, RemoteVault};
pub use config::SyncConfig;
pub use index::RemoteIndex;
pub use retry::{RetryConfig, RetryExecutor};
pub use worker::{SyncStats, SyncWorker};
