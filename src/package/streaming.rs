//! Two-pass streaming package verification.
//!
//! [`streaming_read_package`] verifies a package file without loading the
//! package or its payload into memory, then returns a reader that streams
//! the authenticated payload.
//!
//! The file is processed in two passes. Pass 0 hashes the `data` value as
//! it streams by, collects the key digest and signature, and verifies the
//! signature; no payload byte is exposed until that check has passed.
//! Pass 1 reopens the decompressed stream and parks it at the first byte
//! of the payload, which the returned [`PayloadReader`] then streams.
//!
//! No lock is held on the file between passes; a host that swaps the file
//! mid-verification can feed the caller unverified bytes. That host is
//! already trusted with the client's keys and traffic.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::ZlibDecoder;
use sha2::Digest;

use crate::crypto::{decode_public_key, public_key_digest, verify_digest, Sha256};
use crate::error::{Error, Result};
use crate::package::json_stream::{classify_source_error, Flow, JsonStreamParser, ValueReader, ValueScan};

/// JSON member holding the payload.
const FIELD_DATA: &str = "data";
/// JSON member holding the signing public key digest.
const FIELD_KEY_DIGEST: &str = "signingPublicKeyDigest";
/// JSON member holding the signature.
const FIELD_SIGNATURE: &str = "signature";

/// Cap on the encoded length of the digest and signature members. A
/// 32-byte digest is 44 base64 characters and a 4096-bit signature 684;
/// anything near the cap is hostile.
const MAX_METADATA_VALUE_LEN: usize = 1024;

/// Extract and verify the payload of a package file, streaming.
///
/// The package must have been signed with the key identified by
/// `public_key`. Neither the package nor the payload is held in memory;
/// peak usage is a small constant regardless of payload size. The
/// returned reader yields the verified payload and releases the file when
/// dropped.
pub fn streaming_read_package(
    package_path: impl AsRef<Path>,
    public_key: &str,
) -> Result<PayloadReader> {
    let file = File::open(package_path)?;
    let file = verify_pass(file, public_key)?;
    expose_pass(file)
}

/// Pass 0: hash the payload, collect the metadata, verify the signature.
/// Returns the file for reuse by pass 1.
fn verify_pass(mut file: File, public_key: &str) -> Result<File> {
    file.seek(SeekFrom::Start(0))?;
    let mut decoder = ZlibDecoder::new(file);

    let mut payload_hash = Sha256::new();
    let mut payload_seen = false;
    let mut key_digest: Option<Vec<u8>> = None;
    let mut signature: Option<Vec<u8>> = None;

    let mut parser = JsonStreamParser::new(&mut decoder);
    parser.parse(|key, value| match key {
        FIELD_DATA => {
            if payload_seen {
                return Err(duplicate(FIELD_DATA));
            }
            payload_seen = true;
            io::copy(value, &mut payload_hash).map_err(classify_source_error)?;
            Ok(Flow::Continue)
        }
        FIELD_KEY_DIGEST => {
            if key_digest.is_some() {
                return Err(duplicate(FIELD_KEY_DIGEST));
            }
            key_digest = Some(read_base64_value(value, FIELD_KEY_DIGEST)?);
            Ok(Flow::Continue)
        }
        FIELD_SIGNATURE => {
            if signature.is_some() {
                return Err(duplicate(FIELD_SIGNATURE));
            }
            signature = Some(read_base64_value(value, FIELD_SIGNATURE)?);
            Ok(Flow::Continue)
        }
        other => Err(Error::corrupt(format!("unexpected field {:?}", other))),
    })?;

    let (key_digest, signature) = match (key_digest, signature) {
        (Some(digest), Some(signature)) => (digest, signature),
        _ => return Err(Error::corrupt("missing expected field")),
    };

    let verifying_key = decode_public_key(public_key)?;
    if key_digest != public_key_digest(public_key) {
        return Err(Error::KeyMismatch);
    }
    let payload_digest: [u8; 32] = payload_hash.finalize().into();
    verify_digest(&verifying_key, &payload_digest, &signature)?;

    Ok(decoder.into_inner())
}

/// Pass 1: park the decompressed stream at the first payload byte and
/// hand it to the caller.
fn expose_pass(mut file: File) -> Result<PayloadReader> {
    file.seek(SeekFrom::Start(0))?;
    let mut decoder = ZlibDecoder::new(file);

    let mut payload_found = false;
    let mut parser = JsonStreamParser::new(&mut decoder);
    parser.parse(|key, value| match key {
        FIELD_DATA => {
            payload_found = true;
            // Leave the stream at the payload's first byte
            Ok(Flow::Halt)
        }
        FIELD_KEY_DIGEST | FIELD_SIGNATURE => {
            io::copy(value, &mut io::sink()).map_err(classify_source_error)?;
            Ok(Flow::Continue)
        }
        other => Err(Error::corrupt(format!("unexpected field {:?}", other))),
    })?;

    if !payload_found {
        return Err(Error::corrupt("missing expected field"));
    }

    Ok(PayloadReader {
        scan: ValueScan::default(),
        decoder,
    })
}

fn duplicate(field: &str) -> Error {
    Error::corrupt(format!("duplicate field {:?}", field))
}

/// Read a small base64 string value to its end and decode it.
fn read_base64_value(value: &mut ValueReader<'_>, field: &str) -> Result<Vec<u8>> {
    let mut encoded = Vec::new();
    value
        .by_ref()
        .take((MAX_METADATA_VALUE_LEN + 1) as u64)
        .read_to_end(&mut encoded)
        .map_err(classify_source_error)?;
    if encoded.len() > MAX_METADATA_VALUE_LEN {
        return Err(Error::corrupt(format!("{:?} value too long", field)));
    }
    STANDARD
        .decode(&encoded)
        .map_err(|e| Error::corrupt(format!("{:?} base64: {}", field, e)))
}

/// Reader over a verified payload.
///
/// Owns the package file and its decompressor; both are released on drop.
/// Yields the payload's bytes in stream order and reports end-of-input at
/// the payload's end.
#[derive(Debug)]
pub struct PayloadReader {
    scan: ValueScan,
    decoder: ZlibDecoder<File>,
}

impl Read for PayloadReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.scan.read_value(&mut self.decoder, buf)
    }
}
