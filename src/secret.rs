//! Random material for OTP issuance.
//!
//! Both generators draw from the OS random source. Passwords are decimal
//! digits only (leading zeros are legal; the value is a string, never a
//! number); client tokens are opaque URL-safe strings.

use base64::Engine;
use rand::{Rng, RngCore, rngs::OsRng};

const CLIENT_TOKEN_BYTES: usize = 32;

/// Generate a numeric one-time password of `length` digits.
#[must_use]
pub fn numeric_password(length: u32) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..=9)))
        .collect()
}

/// Generate a fresh client token.
///
/// The raw value is returned to the caller once per rotation; the record
/// stores it for the next handshake comparison.
///
/// # Errors
/// Fails only if the OS random source does.
pub fn client_token() -> Result<String, rand::Error> {
    let mut bytes = [0u8; CLIENT_TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{CLIENT_TOKEN_BYTES, client_token, numeric_password};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn numeric_password_is_all_digits_of_requested_length() {
        for length in [1, 6, 10, 32] {
            let password = numeric_password(length);
            assert_eq!(password.chars().count(), length as usize);
            assert!(password.chars().all(|ch| ch.is_ascii_digit()));
        }
    }

    #[test]
    fn numeric_password_zero_length_is_empty() {
        assert_eq!(numeric_password(0), "");
    }

    #[test]
    fn client_token_round_trip() {
        let decoded_len = client_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(CLIENT_TOKEN_BYTES));
    }

    #[test]
    fn client_tokens_do_not_repeat() {
        let first = client_token().unwrap();
        let second = client_token().unwrap();
        assert_ne!(first, second);
    }
}
