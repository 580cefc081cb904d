//! Token payload codec
//!
//! A payload is the fixed-format data element that follows the genesis binding in a
//! token output's locking script. Fields are positional and fixed-width, and the
//! final byte is a tag that tells the decoder which field set precedes it:
//! - **nft** - Issue / Transfer / Swap / Sell states of a non-fungible token
//! - **fungible** - Mint / Transfer / Swap / Sell states of the companion fungible token
//!
//! Numeric fields are little-endian and fixed-width (8 bytes for ids and amounts,
//! 4 bytes for output indexes), matching how the covenant reads them on-script.

use std::io::{Cursor, Read};

use bitcoin::hashes::Hash;
use bitcoin::PubkeyHash;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{TokenError, TokenResult};

pub mod fungible;
pub mod nft;

pub use fungible::FungiblePayload;
pub use nft::NftPayload;

/// Length of a public-key hash field
pub const PKH_LEN: usize = 20;
/// Length of a 32-byte hash field
pub const HASH256_LEN: usize = 32;
/// Length of an amount / token id / satoshi field
pub const AMOUNT_LEN: usize = 8;
/// Length of an output index field
pub const INDEX_LEN: usize = 4;
/// Length of the trailing type tag
pub const TAG_LEN: usize = 1;

/// Encoding contract shared by every payload family
pub trait PayloadCodec: Sized + Clone + std::fmt::Debug + PartialEq {
    /// Serialise to the exact on-script byte layout, tag byte last
    fn encode(&self) -> Vec<u8>;

    /// Parse bytes produced by [`PayloadCodec::encode`]
    fn decode(bytes: &[u8]) -> TokenResult<Self>;

    /// Trailing type tag of this variant
    fn tag(&self) -> u8;

    /// Short variant name for logs and CLI output
    fn kind(&self) -> &'static str;

    /// Owner of the output, when the variant has one
    fn owner_pkh(&self) -> Option<PubkeyHash>;
}

/// Split off the trailing tag and check the body length expected for it
pub(crate) fn split_tag(bytes: &[u8]) -> TokenResult<(&[u8], u8)> {
    match bytes.split_last() {
        Some((tag, body)) => Ok((body, *tag)),
        None => Err(TokenError::malformed("empty payload")),
    }
}

pub(crate) fn expect_len(bytes: &[u8], expected: usize, kind: &str) -> TokenResult<()> {
    if bytes.len() != expected {
        return Err(TokenError::malformed(format!(
            "{} payload must be {} bytes, got {}",
            kind,
            expected,
            bytes.len()
        )));
    }
    Ok(())
}

/// Fixed-width field reader over a payload body
pub(crate) struct FieldReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(body: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(body),
        }
    }

    pub(crate) fn pkh(&mut self) -> TokenResult<PubkeyHash> {
        let bytes: [u8; PKH_LEN] = self.array()?;
        Ok(PubkeyHash::from_byte_array(bytes))
    }

    pub(crate) fn u64(&mut self) -> TokenResult<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| TokenError::malformed(format!("failed to read 8-byte field: {}", e)))
    }

    pub(crate) fn u32(&mut self) -> TokenResult<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| TokenError::malformed(format!("failed to read 4-byte field: {}", e)))
    }

    pub(crate) fn array<const N: usize>(&mut self) -> TokenResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.cursor.read_exact(&mut buf).map_err(|e| {
            TokenError::malformed(format!("failed to read {}-byte field: {}", N, e))
        })?;
        Ok(buf)
    }
}

/// Fixed-width field writer producing a payload
pub(crate) struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn pkh(mut self, pkh: &PubkeyHash) -> Self {
        self.buf.extend_from_slice(pkh.as_byte_array());
        self
    }

    pub(crate) fn u64(mut self, value: u64) -> Self {
        // Writing into a Vec cannot fail
        let _ = self.buf.write_u64::<LittleEndian>(value);
        self
    }

    pub(crate) fn u32(mut self, value: u32) -> Self {
        let _ = self.buf.write_u32::<LittleEndian>(value);
        self
    }

    pub(crate) fn bytes(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub(crate) fn finish(mut self, tag: u8) -> Vec<u8> {
        self.buf.push(tag);
        self.buf
    }
}
