//! Transition plans
//!
//! - **builder** - one pure function per operation, producing a [`TransitionPlan`]
//! - **assemble** - funding, change and fee arithmetic into an unsigned transaction
//!
//! A plan names the outputs a transition consumes and the outputs it produces.
//! Produced token outputs are constructed as fresh values from the lineage context;
//! nothing is mutated between successive outputs.

use std::fmt;

use bitcoin::{Amount, OutPoint, PubkeyHash, ScriptBuf, TxOut};

use crate::genesis::GenesisBinding;
use crate::output::TokenOutput;
use crate::payload::{FungiblePayload, NftPayload, PayloadCodec};

pub mod assemble;
pub mod builder;

pub use assemble::{assemble, FundingInput, UnsignedTransition};
pub use builder::{SpentToken, TransitionBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Genesis,
    Issue,
    Transfer,
    MakeSwap,
    CancelSwap,
    CompleteSwap,
    Sell,
    CancelSell,
    Buy,
    Burn,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Genesis => "genesis",
            Operation::Issue => "issue",
            Operation::Transfer => "transfer",
            Operation::MakeSwap => "make-swap",
            Operation::CancelSwap => "cancel-swap",
            Operation::CompleteSwap => "complete-swap",
            Operation::Sell => "sell",
            Operation::CancelSell => "cancel-sell",
            Operation::Buy => "buy",
            Operation::Burn => "burn",
        }
    }

    /// Whether spending a token input of this operation needs a spend-proof
    pub fn requires_spend_proof(&self) -> bool {
        !matches!(self, Operation::Genesis | Operation::Burn)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A token output of either family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyTokenOutput {
    Nft(TokenOutput<NftPayload>),
    Fungible(TokenOutput<FungiblePayload>),
}

impl AnyTokenOutput {
    pub fn genesis(&self) -> &GenesisBinding {
        match self {
            AnyTokenOutput::Nft(output) => &output.genesis,
            AnyTokenOutput::Fungible(output) => &output.genesis,
        }
    }

    pub fn code_part(&self) -> &ScriptBuf {
        match self {
            AnyTokenOutput::Nft(output) => &output.code_part,
            AnyTokenOutput::Fungible(output) => &output.code_part,
        }
    }

    pub fn satoshis(&self) -> u64 {
        match self {
            AnyTokenOutput::Nft(output) => output.satoshis,
            AnyTokenOutput::Fungible(output) => output.satoshis,
        }
    }

    pub fn owner_pkh(&self) -> Option<PubkeyHash> {
        match self {
            AnyTokenOutput::Nft(output) => output.payload.owner_pkh(),
            AnyTokenOutput::Fungible(output) => output.payload.owner_pkh(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnyTokenOutput::Nft(output) => output.payload.kind(),
            AnyTokenOutput::Fungible(output) => output.payload.kind(),
        }
    }

    pub fn payload_bytes(&self) -> Vec<u8> {
        match self {
            AnyTokenOutput::Nft(output) => output.payload.encode(),
            AnyTokenOutput::Fungible(output) => output.payload.encode(),
        }
    }

    pub fn locking_script(&self) -> ScriptBuf {
        match self {
            AnyTokenOutput::Nft(output) => output.locking_script(),
            AnyTokenOutput::Fungible(output) => output.locking_script(),
        }
    }

    pub fn to_txout(&self) -> TxOut {
        match self {
            AnyTokenOutput::Nft(output) => output.to_txout(),
            AnyTokenOutput::Fungible(output) => output.to_txout(),
        }
    }

    pub fn as_nft(&self) -> Option<&TokenOutput<NftPayload>> {
        match self {
            AnyTokenOutput::Nft(output) => Some(output),
            AnyTokenOutput::Fungible(_) => None,
        }
    }

    pub fn as_fungible(&self) -> Option<&TokenOutput<FungiblePayload>> {
        match self {
            AnyTokenOutput::Fungible(output) => Some(output),
            AnyTokenOutput::Nft(_) => None,
        }
    }
}

impl From<TokenOutput<NftPayload>> for AnyTokenOutput {
    fn from(output: TokenOutput<NftPayload>) -> Self {
        AnyTokenOutput::Nft(output)
    }
}

impl From<TokenOutput<FungiblePayload>> for AnyTokenOutput {
    fn from(output: TokenOutput<FungiblePayload>) -> Self {
        AnyTokenOutput::Fungible(output)
    }
}

/// An output spent by the transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedOutput {
    pub outpoint: OutPoint,
    /// `None` for the plain origin output spent at genesis
    pub token: Option<AnyTokenOutput>,
    pub satoshis: u64,
    pub script_pubkey: ScriptBuf,
}

impl ConsumedOutput {
    pub fn token(outpoint: OutPoint, token: AnyTokenOutput) -> Self {
        Self {
            outpoint,
            satoshis: token.satoshis(),
            script_pubkey: token.locking_script(),
            token: Some(token),
        }
    }

    pub fn plain(outpoint: OutPoint, satoshis: u64, script_pubkey: ScriptBuf) -> Self {
        Self {
            outpoint,
            token: None,
            satoshis,
            script_pubkey,
        }
    }
}

/// An output created by the transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducedOutput {
    Token(AnyTokenOutput),
    /// Plain P2PKH payment, e.g. the seller's proceeds of a buy
    Payment { pkh: PubkeyHash, satoshis: u64 },
}

impl ProducedOutput {
    pub fn satoshis(&self) -> u64 {
        match self {
            ProducedOutput::Token(token) => token.satoshis(),
            ProducedOutput::Payment { satoshis, .. } => *satoshis,
        }
    }

    pub fn as_token(&self) -> Option<&AnyTokenOutput> {
        match self {
            ProducedOutput::Token(token) => Some(token),
            ProducedOutput::Payment { .. } => None,
        }
    }

    pub fn to_txout(&self) -> TxOut {
        match self {
            ProducedOutput::Token(token) => token.to_txout(),
            ProducedOutput::Payment { pkh, satoshis } => TxOut {
                value: Amount::from_sat(*satoshis),
                script_pubkey: ScriptBuf::new_p2pkh(pkh),
            },
        }
    }
}

/// Fee allocation the plan expects assembly to honour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeHint {
    pub fee: u64,
    pub consumed_satoshis: u64,
    pub produced_satoshis: u64,
}

impl FeeHint {
    /// Satoshis that funding inputs must contribute at minimum
    pub fn funding_needed(&self) -> u64 {
        self.produced_satoshis
            .saturating_add(self.fee)
            .saturating_sub(self.consumed_satoshis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub operation: Operation,
    pub consumed: Vec<ConsumedOutput>,
    pub produced: Vec<ProducedOutput>,
    pub fee_hint: FeeHint,
}

impl TransitionPlan {
    pub(crate) fn new(
        operation: Operation,
        consumed: Vec<ConsumedOutput>,
        produced: Vec<ProducedOutput>,
        fee: u64,
    ) -> Self {
        let fee_hint = FeeHint {
            fee,
            consumed_satoshis: consumed.iter().map(|c| c.satoshis).sum(),
            produced_satoshis: produced.iter().map(ProducedOutput::satoshis).sum(),
        };
        Self {
            operation,
            consumed,
            produced,
            fee_hint,
        }
    }

    pub fn produced_tokens(&self) -> impl Iterator<Item = &AnyTokenOutput> {
        self.produced.iter().filter_map(ProducedOutput::as_token)
    }

    pub fn consumed_tokens(&self) -> impl Iterator<Item = (&ConsumedOutput, &AnyTokenOutput)> {
        self.consumed
            .iter()
            .filter_map(|c| c.token.as_ref().map(|token| (c, token)))
    }
}
