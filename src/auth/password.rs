//! PBKDF2-HMAC-SHA256 password hashing.
//!
//! The stored hash is `<rounds>$<hex digest>` so the work factor can be raised
//! without invalidating existing accounts.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use super::constant_time_compare;

#[cfg(not(test))]
const PBKDF2_ROUNDS: u32 = 600_000;
#[cfg(test)]
const PBKDF2_ROUNDS: u32 = 1_000;

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// Hex-encoded salt and derived hash, as stored on the user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub salt: String,
    pub hash: String,
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> PasswordHash {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    let hash = format!(
        "{}${}",
        PBKDF2_ROUNDS,
        derive(password, &salt, PBKDF2_ROUNDS)
    );
    PasswordHash { salt, hash }
}

/// Check a candidate password against a stored hash in constant time.
pub fn verify_password(password: &str, stored: &PasswordHash) -> bool {
    let Some((rounds, expected)) = stored.hash.split_once('$') else {
        return false;
    };
    match rounds.parse::<u32>() {
        Ok(rounds) if rounds > 0 => {
            constant_time_compare(&derive(password, &stored.salt, rounds), expected)
        }
        _ => false,
    }
}

fn derive(password: &str, salt: &str, rounds: u32) -> String {
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), rounds, &mut digest);
    hex::encode(digest)
}
