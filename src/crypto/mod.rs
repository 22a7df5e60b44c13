//! Cryptographic primitives for Sealbox.
//!
//! This module provides:
//! - AES-256-GCM record sealing (`encryption`)
//! - PBKDF2 password-based key derivation (`kdf`)
//! - HKDF splitting into encryption and MAC keys (`keys`)
//! - The named key cache abstraction (`key_cache`)
//! - The file-level HMAC accumulator (`mac`)
//! - `CryptoEngine`, which ties them together (`engine`)

pub mod encryption;
pub mod engine;
pub mod kdf;
pub mod key_cache;
pub mod keys;
pub mod mac;

pub use encryption::{decrypt, encrypt, BLOCK_SIZE};
pub use engine::CryptoEngine;
pub use kdf::{derive_keys, DEFAULT_ITERATIONS, MIN_ITERATIONS};
pub use key_cache::{KeyCache, MemoryKeyCache};
pub use keys::{DerivedKeys, KeyNames};
pub use mac::{FileMac, MAC_LEN};
