//! FORKID signature-hash preimage
//!
//! BIP143-style digest used with the FORKID flag: version, prevouts hash, sequence
//! hash, outpoint, script code, value, sequence, outputs hash, locktime and sighash
//! type. With ANYONECANPAY the prevouts and sequence hashes are zero, so a token
//! input's signature commits to that input alone and other parties may add theirs.

use bitcoin::consensus::encode::{serialize, Encodable};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{Script, Transaction};

use crate::errors::{AuthorizationClause, TokenError, TokenResult};

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;
pub const SIGHASH_FORKID: u32 = 0x40;

/// Policy for token inputs
pub const TOKEN_SIGHASH_TYPE: u32 = SIGHASH_ALL | SIGHASH_FORKID | SIGHASH_ANYONECANPAY;
/// Policy for plain P2PKH funding inputs
pub const FUNDING_SIGHASH_TYPE: u32 = SIGHASH_ALL | SIGHASH_FORKID;

fn hash_all<T: Encodable>(items: impl Iterator<Item = T>) -> [u8; 32] {
    let mut buf = Vec::new();
    for item in items {
        buf.extend(serialize(&item));
    }
    sha256d::Hash::hash(&buf).to_byte_array()
}

/// Preimage for signing input `input_index` spending `value` satoshis locked by `script_code`
pub fn preimage(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    value: u64,
    sighash_type: u32,
) -> TokenResult<Vec<u8>> {
    let input = tx.input.get(input_index).ok_or_else(|| {
        TokenError::unauthorized(
            AuthorizationClause::WrongInput,
            format!(
                "input {} out of range ({} inputs)",
                input_index,
                tx.input.len()
            ),
        )
    })?;
    let anyone_can_pay = sighash_type & SIGHASH_ANYONECANPAY != 0;

    let (hash_prevouts, hash_sequence) = if anyone_can_pay {
        ([0u8; 32], [0u8; 32])
    } else {
        (
            hash_all(tx.input.iter().map(|i| i.previous_output)),
            hash_all(tx.input.iter().map(|i| i.sequence)),
        )
    };
    let hash_outputs = hash_all(tx.output.iter().cloned());

    let mut buf = Vec::with_capacity(156 + script_code.len());
    buf.extend_from_slice(&tx.version.0.to_le_bytes());
    buf.extend_from_slice(&hash_prevouts);
    buf.extend_from_slice(&hash_sequence);
    buf.extend(serialize(&input.previous_output));
    buf.extend(serialize(&script_code.to_owned()));
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(&input.sequence.0.to_le_bytes());
    buf.extend_from_slice(&hash_outputs);
    buf.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
    buf.extend_from_slice(&sighash_type.to_le_bytes());
    Ok(buf)
}

/// Double SHA-256 of a preimage, the digest that is signed
pub fn digest(preimage: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(preimage).to_byte_array()
}
