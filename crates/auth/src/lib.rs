//! `ripple-auth` — pure authentication primitives.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how
//! to hash/verify passwords and how to mint/expire opaque API tokens, and
//! nothing else.

pub mod password;
pub mod token;

pub use password::{hash_password, verify_password, PasswordError};
pub use token::ApiToken;
