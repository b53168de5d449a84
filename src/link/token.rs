//! Payment link tokens.
//!
//! The token is the only credential a customer needs to view and pay an
//! invoice, so it is drawn from the thread-local CSPRNG (`rand::rng()`,
//! ChaCha seeded from the OS). 22 alphanumeric characters give about 131 bits.

use crate::error::{Error, Result};
use rand::distr::Alphanumeric;
use rand::Rng;

/// Fixed prefix that makes tokens recognisable in logs and URLs.
pub const TOKEN_PREFIX: &str = "pl_";

/// Minimum random characters per token (62^22 > 2^128).
pub const MIN_TOKEN_LENGTH: usize = 22;

/// Generate a fresh token with `length` random characters after the prefix.
///
/// # Errors
///
/// `Error::ConfigError` if `length` is below [`MIN_TOKEN_LENGTH`].
pub fn generate_token(length: usize) -> Result<String> {
    if length < MIN_TOKEN_LENGTH {
        return Err(Error::ConfigError(format!(
            "token length must be at least {}, got {}",
            MIN_TOKEN_LENGTH, length
        )));
    }

    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();

    Ok(format!("{}{}", TOKEN_PREFIX, random))
}

/// Cheap shape check for tokens arriving from a URL.
pub fn is_well_formed(token: &str) -> bool {
    token
        .strip_prefix(TOKEN_PREFIX)
        .is_some_and(|rest| rest.len() >= MIN_TOKEN_LENGTH && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Customer-facing URL for a token: `<origin>/pay/<token>`.
pub fn payment_url(origin: &str, token: &str) -> String {
    format!("{}/pay/{}", origin.trim_end_matches('/'), token)
}
