//! Versioned on-disk cache for parsed datasets.
//!
//! Each entry is one file named after its [`CacheKey`]. The file starts with
//! a [`Header`] carrying the file magic, the format version of this crate,
//! the caller's version tag and the key name, followed by the bincode encoded
//! payload. Entries with any mismatch are reported as
//! [`CacheStatus::Invalid`] so that callers can fall back to re-parsing.

mod common;

pub use key::*;
mod key;

pub use store::*;
mod store;
