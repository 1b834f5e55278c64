//! Cryptographic primitives for signed data packages.
//!
//! This module provides:
//! - SHA-256 digests (one-shot and incremental)
//! - RSA-4096 key pair generation and base64/DER key codecs
//! - RSA PKCS#1 v1.5 signing and verification with SHA-256
//!
//! Transient private key material is zeroized after use.

mod digest;
mod keys;
mod signing;

pub use digest::{sha256, Sha256, DIGEST_LEN};
pub use keys::{decode_private_key, decode_public_key, generate_keys, public_key_digest};
#[cfg(test)]
pub(crate) use keys::generate_keys_with_bits;
pub use signing::{sign_digest, verify_digest};

/// RSA modulus size in bits for generated signing keys.
pub const RSA_KEY_BITS: usize = 4096;
