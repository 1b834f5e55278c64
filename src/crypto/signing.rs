//! RSA PKCS#1 v1.5 signatures over SHA-256 digests.
//!
//! Both sides operate on an externally computed digest so the streaming
//! verifier can hash a payload incrementally and sign-check the result
//! without ever holding the payload itself.

use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{Error, Result};

/// Sign a SHA-256 digest with RSA PKCS#1 v1.5.
pub fn sign_digest(private_key: &RsaPrivateKey, digest: &[u8]) -> Result<Vec<u8>> {
    private_key
        .sign(Pkcs1v15Sign::new::<Sha256>(), digest)
        .map_err(|e| Error::SignFailed(e.to_string()))
}

/// Verify an RSA PKCS#1 v1.5 signature over a SHA-256 digest.
pub fn verify_digest(
    public_key: &RsaPublicKey,
    digest: &[u8],
    signature: &[u8],
) -> Result<()> {
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), digest, signature)
        .map_err(|_| Error::SignatureInvalid)
}
