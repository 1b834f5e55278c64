//! RSA signing key generation and encoding.
//!
//! Keys travel as base64-wrapped DER: SubjectPublicKeyInfo for public keys
//! and PKCS#1 RSAPrivateKey for private keys. The signing public key digest
//! carried inside packages is the SHA-256 of the ASCII base64 form of the
//! public key, not of the underlying DER bytes.

use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroize;

use crate::crypto::{sha256, RSA_KEY_BITS, DIGEST_LEN};
use crate::error::{Error, Result};

/// Generate a new RSA-4096 signing key pair.
///
/// Returns `(public_key, private_key)` as base64 strings suitable for
/// [`write_package`](crate::write_package) and the verification entry
/// points.
pub fn generate_keys() -> Result<(String, String)> {
    generate_keys_with_bits(RSA_KEY_BITS)
}

pub(crate) fn generate_keys_with_bits(bits: usize) -> Result<(String, String)> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| Error::KeyGeneration(e.to_string()))?;

    let public_der = RsaPublicKey::from(&private_key)
        .to_public_key_der()
        .map_err(|e| Error::KeyGeneration(e.to_string()))?;
    let private_der = private_key
        .to_pkcs1_der()
        .map_err(|e| Error::KeyGeneration(e.to_string()))?;

    Ok((
        STANDARD.encode(public_der.as_bytes()),
        STANDARD.encode(private_der.as_bytes()),
    ))
}

/// Decode a base64 DER SubjectPublicKeyInfo public key.
///
/// Rejects keys that are not RSA.
pub fn decode_public_key(public_key: &str) -> Result<RsaPublicKey> {
    let der = STANDARD
        .decode(public_key)
        .map_err(|e| Error::invalid_key(format!("public key base64: {}", e)))?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| Error::invalid_key(format!("public key DER: {}", e)))
}

/// Decode a base64 DER PKCS#1 private key.
pub fn decode_private_key(private_key: &str) -> Result<RsaPrivateKey> {
    let mut der = STANDARD
        .decode(private_key)
        .map_err(|e| Error::invalid_key(format!("private key base64: {}", e)))?;
    let key = RsaPrivateKey::from_pkcs1_der(&der)
        .map_err(|e| Error::invalid_key(format!("private key DER: {}", e)));
    der.zeroize();
    key
}

/// Digest identifying a signing public key inside a package.
///
/// Hashes the ASCII base64 characters of the key string for compatibility
/// with the legacy producer format.
pub fn public_key_digest(public_key: &str) -> [u8; DIGEST_LEN] {
    sha256(public_key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_decode() {
        let (public_key, private_key) = generate_keys_with_bits(2048).unwrap();

        let decoded_public = decode_public_key(&public_key).unwrap();
        let decoded_private = decode_private_key(&private_key).unwrap();

        // The decoded pair must agree
        assert_eq!(RsaPublicKey::from(&decoded_private), decoded_public);
    }

    #[test]
    #[ignore] // 4096-bit generation takes minutes in debug builds; run with --ignored
    fn test_generate_default_key_size() {
        let (public_key, _) = generate_keys().unwrap();
        let decoded = decode_public_key(&public_key).unwrap();
        assert_eq!(rsa::traits::PublicKeyParts::size(&decoded) * 8, RSA_KEY_BITS);
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let err = decode_public_key("not//valid??base64!").unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));

        let err = decode_private_key("not//valid??base64!").unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn test_decode_rejects_bad_der() {
        let garbage = STANDARD.encode(b"this is not DER");
        let err = decode_public_key(&garbage).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));

        let err = decode_private_key(&garbage).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn test_public_key_digest_is_over_ascii() {
        let (public_key, _) = generate_keys_with_bits(2048).unwrap();
        let digest = public_key_digest(&public_key);
        // The digest is over the base64 characters, not the decoded DER
        assert_eq!(digest, sha256(public_key.as_bytes()));
        assert_ne!(digest, sha256(&STANDARD.decode(&public_key).unwrap()));
    }

    #[test]
    fn test_digests_differ_across_keys() {
        let (public_a, _) = generate_keys_with_bits(2048).unwrap();
        let (public_b, _) = generate_keys_with_bits(2048).unwrap();
        assert_ne!(public_key_digest(&public_a), public_key_digest(&public_b));
    }
}
