//! Genesis binding
//!
//! Every output of a token lineage carries the same 40-byte binding to the outpoint
//! the lineage was created from: `originTxId(32, internal byte order) ‖
//! LE32(originOutputIndex) ‖ LE32(issueOutputIndex)`. The binding is fixed once at
//! genesis and copied verbatim into every later output; verifiers compare it
//! byte-for-byte to decide that two outputs belong to one lineage.

use std::fmt;

use bitcoin::hashes::Hash;
use bitcoin::{OutPoint, Txid};
use sha2::{Digest, Sha256};

use crate::errors::{TokenError, TokenResult};
use crate::payload::FieldReader;

/// Encoded length of a genesis binding
pub const GENESIS_LEN: usize = 32 + 4 + 4;

/// Immutable anchor of a token lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenesisBinding {
    pub origin_txid: Txid,
    pub origin_output_index: u32,
    /// Index of the first issue output inside the genesis transaction
    pub issue_output_index: u32,
}

impl GenesisBinding {
    /// Fix the binding for a new lineage
    pub fn bind(origin_txid: Txid, origin_output_index: u32, issue_output_index: u32) -> Self {
        Self {
            origin_txid,
            origin_output_index,
            issue_output_index,
        }
    }

    /// Bind with the issue output at index 0, as every genesis transaction lays it out
    pub fn bind_default(origin_txid: Txid, origin_output_index: u32) -> Self {
        Self::bind(origin_txid, origin_output_index, 0)
    }

    /// The outpoint the genesis transaction spends
    pub fn origin_outpoint(&self) -> OutPoint {
        OutPoint::new(self.origin_txid, self.origin_output_index)
    }

    pub fn encode(&self) -> [u8; GENESIS_LEN] {
        let mut out = [0u8; GENESIS_LEN];
        out[..32].copy_from_slice(self.origin_txid.as_byte_array());
        out[32..36].copy_from_slice(&self.origin_output_index.to_le_bytes());
        out[36..].copy_from_slice(&self.issue_output_index.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> TokenResult<Self> {
        if bytes.len() != GENESIS_LEN {
            return Err(TokenError::malformed(format!(
                "genesis binding must be {} bytes, got {}",
                GENESIS_LEN,
                bytes.len()
            )));
        }
        let mut reader = FieldReader::new(bytes);
        let txid: [u8; 32] = reader.array()?;
        Ok(Self {
            origin_txid: Txid::from_byte_array(txid),
            origin_output_index: reader.u32()?,
            issue_output_index: reader.u32()?,
        })
    }

    /// Fail with `LineageMismatch` unless `other` is this exact binding
    pub fn ensure_same(&self, other: &GenesisBinding) -> TokenResult<()> {
        if self != other {
            return Err(TokenError::mismatch("genesis", self, other));
        }
        Ok(())
    }
}

impl fmt::Display for GenesisBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.origin_txid, self.origin_output_index, self.issue_output_index
        )
    }
}

/// SHA-256 of `code_part ‖ genesis`, the identity an NFT swap offer names
/// for the fungible lineage it accepts in exchange
pub fn code_with_genesis_hash(code_part: &[u8], genesis: &GenesisBinding) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(code_part);
    hasher.update(genesis.encode());
    hasher.finalize().into()
}
