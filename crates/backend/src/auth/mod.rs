//! Authentication module for JWT sessions with local and Google login.
//!
//! This module provides:
//! - JWT session token creation and validation
//! - Argon2id password hashing
//! - The credential store port and its in-memory actor implementation
//! - Local registration/login and the Google OAuth flow
//! - `require_auth` session middleware and `require_csrf` double-submit guard

mod csrf;
mod google;
mod handlers;
pub mod jwt;
mod middleware;
mod password;
pub mod service;
pub mod store;
pub mod types;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

pub use csrf::{require_csrf, CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
pub use handlers::{
    auth_callback, auth_change_password, auth_csrf_token, auth_login, auth_logout, auth_me,
    auth_register, auth_update_me, google_login,
};
pub use middleware::{require_auth, CookiePolicy, OAUTH_STATE_COOKIE_NAME, SESSION_COOKIE_NAME};

/// `len` bytes from the OS RNG, base64url encoded without padding.
pub(crate) fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Equality whose running time does not depend on where the inputs differ.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    // Length is not secret; `ct_eq` on unequal lengths is false anyway.
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
