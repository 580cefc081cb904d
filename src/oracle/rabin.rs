//! Rabin signature check for oracle attestations
//!
//! The oracle signs `message ‖ padding` with a Rabin key. The signed value is
//! derived from `hx = sha256(message ‖ padding)` as the little-endian unsigned
//! integer of `sha256(hx[..16]) ‖ sha256(hx[16..])`. A signature `s` is valid
//! for modulus `n` when `s² mod n == h mod n`.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};

use crate::errors::{TokenError, TokenResult};

/// Parse a hex modulus (as published by the oracle)
pub fn parse_pubkey(hex_modulus: &str) -> TokenResult<BigUint> {
    let trimmed = hex_modulus.trim_start_matches("0x");
    BigUint::parse_bytes(trimmed.as_bytes(), 16)
        .filter(|n| *n > BigUint::from(1u8))
        .ok_or_else(|| TokenError::rejected(format!("invalid Rabin modulus: {}", hex_modulus)))
}

/// The integer the oracle signs for `message ‖ padding`
pub fn rabin_hash(message: &[u8], padding: &[u8]) -> BigUint {
    let mut hasher = Sha256::new();
    hasher.update(message);
    hasher.update(padding);
    let hx = hasher.finalize();

    let mut expanded = Vec::with_capacity(64);
    expanded.extend_from_slice(&Sha256::digest(&hx[..16]));
    expanded.extend_from_slice(&Sha256::digest(&hx[16..]));
    BigUint::from_bytes_le(&expanded)
}

pub fn verify(signature: &BigUint, message: &[u8], padding: &[u8], modulus: &BigUint) -> bool {
    (signature * signature) % modulus == rabin_hash(message, padding) % modulus
}
