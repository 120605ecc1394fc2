//! Cryptographic primitives for SealPass.
//!
//! This module provides:
//! - Key derivation using PBKDF2-HMAC-SHA256
//! - Authenticated encryption using AES-256-GCM
//! - The base64 `EncryptedBlob` wire format
//! - Key types with automatic zeroization
//! - A password generator
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Every encryption draws a fresh random IV

pub mod aead;
pub mod blob;
pub mod generator;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, decrypt_str, encrypt, encrypt_str};
pub use blob::EncryptedBlob;
pub use generator::{generate_memorable, generate_password, generate_pin, GeneratorOptions};
pub use kdf::{derive_key, KdfParams};
pub use keys::{Salt, SessionKey};
