//! Zlib compression for the on-disk package format.
//!
//! Packages are stored as zlib streams whose plaintext is the envelope
//! JSON. Decompression failures, including a bad trailing adler32
//! checksum, surface as corruption errors.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// Zlib-compress a byte string at the default compression level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a zlib stream, verifying its trailing checksum.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut plaintext = Vec::new();
    decoder
        .read_to_end(&mut plaintext)
        .map_err(|e| Error::corrupt(format!("zlib decompression: {}", e)))?;
    Ok(plaintext)
}
