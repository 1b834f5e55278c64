//! The signed package envelope and the in-memory producer/consumer paths.
//!
//! An envelope is a JSON object with exactly three string members:
//! `data` (the authenticated payload), `signingPublicKeyDigest` (SHA-256 of
//! the ASCII base64 public key), and `signature` (RSA PKCS#1 v1.5 over
//! SHA-256 of the payload bytes). On disk the JSON is zlib-compressed.
//!
//! These paths hold the whole envelope in memory and are intended for
//! payloads of modest size; [`streaming_read_package`] handles payloads
//! that do not fit.
//!
//! [`streaming_read_package`]: crate::package::streaming_read_package

use serde::{Deserialize, Serialize};

use crate::crypto::{
    decode_private_key, decode_public_key, public_key_digest, sha256, sign_digest, verify_digest,
};
use crate::error::{Error, Result};
use crate::package::compress::{compress, decompress};

/// The signed envelope wrapping a data payload.
///
/// Byte fields travel as standard padded base64 strings in the JSON form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PackageEnvelope {
    /// The authenticated payload
    pub data: String,
    /// SHA-256 of the ASCII base64 form of the signing public key
    #[serde(with = "base64_bytes")]
    pub signing_public_key_digest: Vec<u8>,
    /// RSA PKCS#1 v1.5 signature over SHA-256 of the payload bytes
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// Create a signed, zlib-compressed package containing `data`.
///
/// `public_key` and `private_key` are the base64 key strings produced by
/// [`generate_keys`](crate::crypto::generate_keys).
pub fn write_package(data: &str, public_key: &str, private_key: &str) -> Result<Vec<u8>> {
    let signing_key = decode_private_key(private_key)?;
    let signature = sign_digest(&signing_key, &sha256(data.as_bytes()))?;

    let envelope = PackageEnvelope {
        data: data.to_string(),
        signing_public_key_digest: public_key_digest(public_key).to_vec(),
        signature,
    };
    let envelope_json =
        serde_json::to_vec(&envelope).map_err(|e| Error::Encode(e.to_string()))?;

    compress(&envelope_json)
}

/// Extract and verify the payload of a compressed package.
///
/// The package must have been signed with the key identified by
/// `public_key`; the payload is returned only on total success.
pub fn read_package(compressed_package: &[u8], public_key: &str) -> Result<String> {
    let envelope_json = decompress(compressed_package)?;
    let envelope: PackageEnvelope = serde_json::from_slice(&envelope_json)
        .map_err(|e| Error::corrupt(format!("envelope JSON: {}", e)))?;

    let verifying_key = decode_public_key(public_key)?;

    if envelope.signing_public_key_digest != public_key_digest(public_key) {
        return Err(Error::KeyMismatch);
    }
    verify_digest(
        &verifying_key,
        &sha256(envelope.data.as_bytes()),
        &envelope.signature,
    )?;

    Ok(envelope.data)
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
