//! Authentication primitives.
//!
//! Users sign in elsewhere; this service only validates the HS256 access
//! tokens they present. [`jwt::generate_access_token`] exists for tooling
//! and tests.

pub mod jwt;
