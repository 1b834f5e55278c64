//! Authenticated data packages.
//!
//! A package is a zlib-compressed, digitally signed JSON envelope carrying
//! an opaque payload, such as a list of upstream entry points. Packages
//! may be downloaded from untrusted mirrors, so the payload is only ever
//! surfaced after its RSA signature has been verified.
//!
//! Two consumption paths are provided: [`read_package`] holds the whole
//! envelope in memory, and [`streaming_read_package`] verifies a package
//! file of any size in constant memory, returning a reader over the
//! payload.

mod compress;
mod envelope;
pub mod json_stream;
mod streaming;

pub use envelope::{read_package, write_package, PackageEnvelope};
pub use streaming::{streaming_read_package, PayloadReader};
