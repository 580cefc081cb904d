//! Fungible token payload variants
//!
//! | Tag | Variant  | Layout                                                                 |
//! |-----|----------|------------------------------------------------------------------------|
//! | 00  | Mint     | blockHeader(80) ‖ blockHeight(8) ‖ tag                                 |
//! | 01  | Transfer | ownerPkh(20) ‖ amount(8) ‖ tag                                         |
//! | 02  | Swap     | ownerPkh(20) ‖ amount(8) ‖ genesis(32+4+4) ‖ counterpartyAmount(8) ‖ tag |
//! | 03  | Sell     | ownerPkh(20) ‖ amount(8) ‖ askSatoshis(8) ‖ tag                        |

use bitcoin::PubkeyHash;

use super::{
    expect_len, split_tag, FieldReader, FieldWriter, PayloadCodec, AMOUNT_LEN, PKH_LEN,
};
use crate::errors::{TokenError, TokenResult};
use crate::genesis::{GenesisBinding, GENESIS_LEN};

pub const MINT: u8 = 0x00;
pub const TRANSFER: u8 = 0x01;
pub const SWAP: u8 = 0x02;
pub const SELL: u8 = 0x03;

/// Serialised block header length
pub const BLOCK_HEADER_LEN: usize = 80;

const MINT_BODY_LEN: usize = BLOCK_HEADER_LEN + AMOUNT_LEN;
const OWNED_BODY_LEN: usize = PKH_LEN + AMOUNT_LEN;
const SWAP_BODY_LEN: usize = OWNED_BODY_LEN + GENESIS_LEN + AMOUNT_LEN;
const SELL_BODY_LEN: usize = OWNED_BODY_LEN + AMOUNT_LEN;

/// State of one fungible token output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FungiblePayload {
    /// Mint authority output anchored to a block header
    Mint {
        block_header: [u8; BLOCK_HEADER_LEN],
        block_height: u64,
    },
    Transfer {
        owner_pkh: PubkeyHash,
        amount: u64,
    },
    /// Offer to swap `amount` for `counterparty_amount` units of another lineage,
    /// named by its full genesis outpoint
    Swap {
        owner_pkh: PubkeyHash,
        amount: u64,
        counterparty_genesis: GenesisBinding,
        counterparty_amount: u64,
    },
    Sell {
        owner_pkh: PubkeyHash,
        amount: u64,
        ask_satoshis: u64,
    },
}

impl FungiblePayload {
    /// Token amount held by this output; mint outputs hold none
    pub fn amount(&self) -> u64 {
        match self {
            FungiblePayload::Mint { .. } => 0,
            FungiblePayload::Transfer { amount, .. }
            | FungiblePayload::Swap { amount, .. }
            | FungiblePayload::Sell { amount, .. } => *amount,
        }
    }
}

impl PayloadCodec for FungiblePayload {
    fn encode(&self) -> Vec<u8> {
        match self {
            FungiblePayload::Mint {
                block_header,
                block_height,
            } => FieldWriter::with_capacity(MINT_BODY_LEN + 1)
                .bytes(block_header)
                .u64(*block_height)
                .finish(MINT),
            FungiblePayload::Transfer { owner_pkh, amount } => {
                FieldWriter::with_capacity(OWNED_BODY_LEN + 1)
                    .pkh(owner_pkh)
                    .u64(*amount)
                    .finish(TRANSFER)
            }
            FungiblePayload::Swap {
                owner_pkh,
                amount,
                counterparty_genesis,
                counterparty_amount,
            } => FieldWriter::with_capacity(SWAP_BODY_LEN + 1)
                .pkh(owner_pkh)
                .u64(*amount)
                .bytes(&counterparty_genesis.encode())
                .u64(*counterparty_amount)
                .finish(SWAP),
            FungiblePayload::Sell {
                owner_pkh,
                amount,
                ask_satoshis,
            } => FieldWriter::with_capacity(SELL_BODY_LEN + 1)
                .pkh(owner_pkh)
                .u64(*amount)
                .u64(*ask_satoshis)
                .finish(SELL),
        }
    }

    fn decode(bytes: &[u8]) -> TokenResult<Self> {
        let (body, tag) = split_tag(bytes)?;
        let mut reader = FieldReader::new(body);

        match tag {
            MINT => {
                expect_len(body, MINT_BODY_LEN, "fungible mint")?;
                Ok(FungiblePayload::Mint {
                    block_header: reader.array()?,
                    block_height: reader.u64()?,
                })
            }
            TRANSFER => {
                expect_len(body, OWNED_BODY_LEN, "fungible transfer")?;
                Ok(FungiblePayload::Transfer {
                    owner_pkh: reader.pkh()?,
                    amount: reader.u64()?,
                })
            }
            SWAP => {
                expect_len(body, SWAP_BODY_LEN, "fungible swap")?;
                let owner_pkh = reader.pkh()?;
                let amount = reader.u64()?;
                let genesis: [u8; GENESIS_LEN] = reader.array()?;
                Ok(FungiblePayload::Swap {
                    owner_pkh,
                    amount,
                    counterparty_genesis: GenesisBinding::decode(&genesis)?,
                    counterparty_amount: reader.u64()?,
                })
            }
            SELL => {
                expect_len(body, SELL_BODY_LEN, "fungible sell")?;
                Ok(FungiblePayload::Sell {
                    owner_pkh: reader.pkh()?,
                    amount: reader.u64()?,
                    ask_satoshis: reader.u64()?,
                })
            }
            other => Err(TokenError::malformed(format!(
                "unknown fungible payload tag 0x{:02x}",
                other
            ))),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            FungiblePayload::Mint { .. } => MINT,
            FungiblePayload::Transfer { .. } => TRANSFER,
            FungiblePayload::Swap { .. } => SWAP,
            FungiblePayload::Sell { .. } => SELL,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FungiblePayload::Mint { .. } => "mint",
            FungiblePayload::Transfer { .. } => "transfer",
            FungiblePayload::Swap { .. } => "swap",
            FungiblePayload::Sell { .. } => "sell",
        }
    }

    fn owner_pkh(&self) -> Option<PubkeyHash> {
        match self {
            FungiblePayload::Mint { .. } => None,
            FungiblePayload::Transfer { owner_pkh, .. }
            | FungiblePayload::Swap { owner_pkh, .. }
            | FungiblePayload::Sell { owner_pkh, .. } => Some(*owner_pkh),
        }
    }
}
