//! # Passage
//!
//! Client-side building blocks for a circumvention tunnel: local loopback
//! proxies that feed user traffic into an upstream encrypted transport,
//! and the authenticated data packages that distribute signed
//! configuration blobs (such as lists of upstream entry points) to
//! clients.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │   Local proxies (SOCKS5, HTTP) ── Tunneler seam ── ...   │
//! ├──────────────────────────────────────────────────────────┤
//! │   Authenticated data packages                            │
//! │     envelope ── zlib ── streaming JSON ── two-pass       │
//! │     verify-then-expose                                   │
//! ├──────────────────────────────────────────────────────────┤
//! │   Crypto (SHA-256, RSA-4096 PKCS#1 v1.5, key codecs)     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Packages may be fetched from untrusted mirrors, so their payloads are
//! surfaced only after signature verification. Payloads far larger than
//! memory are handled by [`streaming_read_package`], which verifies and
//! streams them in constant space.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod crypto;
pub mod error;
pub mod package;
pub mod proxy;

pub use crypto::generate_keys;
pub use error::{Error, Result};
pub use package::{read_package, streaming_read_package, write_package, PayloadReader};
