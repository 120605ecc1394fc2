//! Persistent key-value store abstraction for SealPass.
//!
//! The vault core never touches a filesystem or database directly. It reads
//! and writes a handful of well-known keys through the [`KvStore`] trait,
//! which is implemented here for memory and for a single JSON file.
//!
//! # Design Principles
//! - Values are JSON documents, mirroring the browser storage the format
//!   was designed for
//! - All operations are async
//! - `set_many` is all-or-nothing, so a multi-key commit never leaves a
//!   partially written store

pub mod keys;
pub mod local;
pub mod memory;
pub mod provider;

pub use local::FileStore;
pub use memory::MemoryStore;
pub use provider::KvStore;
