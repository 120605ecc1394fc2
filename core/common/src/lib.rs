//! Common utilities and types shared across SealPass crates.
//!
//! This crate provides the error taxonomy used by every layer of the vault
//! core and the identifier types that cross crate boundaries.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::RecordId;
