//! NFT payload variants
//!
//! | Tag | Variant  | Layout                                                          |
//! |-----|----------|-----------------------------------------------------------------|
//! | 00  | Issue    | ownerPkh(20) ‖ tokenId(8) ‖ tag                                 |
//! | 01  | Transfer | ownerPkh(20) ‖ tokenId(8) ‖ tag                                 |
//! | 02  | Swap     | ownerPkh(20) ‖ tokenId(8) ‖ genesisHash(32) ‖ amount(8) ‖ tag    |
//! | 03  | Sell     | ownerPkh(20) ‖ tokenId(8) ‖ askSatoshis(8) ‖ tag                |

use bitcoin::PubkeyHash;

use super::{
    expect_len, split_tag, FieldReader, FieldWriter, PayloadCodec, AMOUNT_LEN, HASH256_LEN,
    PKH_LEN,
};
use crate::errors::{TokenError, TokenResult};

pub const ISSUE: u8 = 0x00;
pub const TRANSFER: u8 = 0x01;
pub const SWAP: u8 = 0x02;
pub const SELL: u8 = 0x03;

const OWNED_BODY_LEN: usize = PKH_LEN + AMOUNT_LEN;
const SWAP_BODY_LEN: usize = OWNED_BODY_LEN + HASH256_LEN + AMOUNT_LEN;
const SELL_BODY_LEN: usize = OWNED_BODY_LEN + AMOUNT_LEN;

/// State of one NFT output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NftPayload {
    /// Issuer's continuation output; `token_id` is the next id to hand out
    Issue { owner_pkh: PubkeyHash, token_id: u64 },
    /// Token held by `owner_pkh`
    Transfer { owner_pkh: PubkeyHash, token_id: u64 },
    /// Standing offer to swap the token for `counterparty_amount` units of the
    /// fungible lineage whose code+genesis hashes to `counterparty_genesis_hash`
    Swap {
        owner_pkh: PubkeyHash,
        token_id: u64,
        counterparty_genesis_hash: [u8; 32],
        counterparty_amount: u64,
    },
    /// Standing offer to sell the token for `ask_satoshis`
    Sell {
        owner_pkh: PubkeyHash,
        token_id: u64,
        ask_satoshis: u64,
    },
}

impl NftPayload {
    pub fn token_id(&self) -> u64 {
        match self {
            NftPayload::Issue { token_id, .. }
            | NftPayload::Transfer { token_id, .. }
            | NftPayload::Swap { token_id, .. }
            | NftPayload::Sell { token_id, .. } => *token_id,
        }
    }

    pub fn owner(&self) -> PubkeyHash {
        match self {
            NftPayload::Issue { owner_pkh, .. }
            | NftPayload::Transfer { owner_pkh, .. }
            | NftPayload::Swap { owner_pkh, .. }
            | NftPayload::Sell { owner_pkh, .. } => *owner_pkh,
        }
    }
}

impl PayloadCodec for NftPayload {
    fn encode(&self) -> Vec<u8> {
        match self {
            NftPayload::Issue {
                owner_pkh,
                token_id,
            } => FieldWriter::with_capacity(OWNED_BODY_LEN + 1)
                .pkh(owner_pkh)
                .u64(*token_id)
                .finish(ISSUE),
            NftPayload::Transfer {
                owner_pkh,
                token_id,
            } => FieldWriter::with_capacity(OWNED_BODY_LEN + 1)
                .pkh(owner_pkh)
                .u64(*token_id)
                .finish(TRANSFER),
            NftPayload::Swap {
                owner_pkh,
                token_id,
                counterparty_genesis_hash,
                counterparty_amount,
            } => FieldWriter::with_capacity(SWAP_BODY_LEN + 1)
                .pkh(owner_pkh)
                .u64(*token_id)
                .bytes(counterparty_genesis_hash)
                .u64(*counterparty_amount)
                .finish(SWAP),
            NftPayload::Sell {
                owner_pkh,
                token_id,
                ask_satoshis,
            } => FieldWriter::with_capacity(SELL_BODY_LEN + 1)
                .pkh(owner_pkh)
                .u64(*token_id)
                .u64(*ask_satoshis)
                .finish(SELL),
        }
    }

    fn decode(bytes: &[u8]) -> TokenResult<Self> {
        let (body, tag) = split_tag(bytes)?;
        let mut reader = FieldReader::new(body);

        match tag {
            ISSUE | TRANSFER => {
                expect_len(body, OWNED_BODY_LEN, "NFT issue/transfer")?;
                let owner_pkh = reader.pkh()?;
                let token_id = reader.u64()?;
                if tag == ISSUE {
                    Ok(NftPayload::Issue {
                        owner_pkh,
                        token_id,
                    })
                } else {
                    Ok(NftPayload::Transfer {
                        owner_pkh,
                        token_id,
                    })
                }
            }
            SWAP => {
                expect_len(body, SWAP_BODY_LEN, "NFT swap")?;
                Ok(NftPayload::Swap {
                    owner_pkh: reader.pkh()?,
                    token_id: reader.u64()?,
                    counterparty_genesis_hash: reader.array()?,
                    counterparty_amount: reader.u64()?,
                })
            }
            SELL => {
                expect_len(body, SELL_BODY_LEN, "NFT sell")?;
                Ok(NftPayload::Sell {
                    owner_pkh: reader.pkh()?,
                    token_id: reader.u64()?,
                    ask_satoshis: reader.u64()?,
                })
            }
            other => Err(TokenError::malformed(format!(
                "unknown NFT payload tag 0x{:02x}",
                other
            ))),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            NftPayload::Issue { .. } => ISSUE,
            NftPayload::Transfer { .. } => TRANSFER,
            NftPayload::Swap { .. } => SWAP,
            NftPayload::Sell { .. } => SELL,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            NftPayload::Issue { .. } => "issue",
            NftPayload::Transfer { .. } => "transfer",
            NftPayload::Swap { .. } => "swap",
            NftPayload::Sell { .. } => "sell",
        }
    }

    fn owner_pkh(&self) -> Option<PubkeyHash> {
        Some(self.owner())
    }
}
