//! One builder per operation
//!
//! Every builder checks the consumed output against the lineage context and the
//! operation's expected state before producing anything, so parameter mistakes
//! surface as `LineageMismatch` before any oracle round-trip.

use bitcoin::{OutPoint, PubkeyHash, ScriptBuf};
use tracing::info;

use super::{ConsumedOutput, Operation, ProducedOutput, TransitionPlan};
use crate::config::TransitionConfig;
use crate::errors::{TokenError, TokenResult};
use crate::lineage::LineageContext;
use crate::output::TokenOutput;
use crate::payload::{FungiblePayload, NftPayload, PayloadCodec};

/// A token output together with the outpoint it lives at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentToken<P> {
    pub outpoint: OutPoint,
    pub output: TokenOutput<P>,
}

impl<P> SpentToken<P> {
    pub fn new(outpoint: OutPoint, output: TokenOutput<P>) -> Self {
        Self { outpoint, output }
    }
}

fn consumed_nft(spent: &SpentToken<NftPayload>) -> ConsumedOutput {
    ConsumedOutput::token(spent.outpoint, spent.output.clone().into())
}

fn consumed_fungible(spent: &SpentToken<FungiblePayload>) -> ConsumedOutput {
    ConsumedOutput::token(spent.outpoint, spent.output.clone().into())
}

fn wrong_state(expected: &'static str, actual: &impl PayloadCodec) -> TokenError {
    TokenError::mismatch("state", expected, actual.kind())
}

/// Builds transition plans for one NFT lineage
#[derive(Debug, Clone)]
pub struct TransitionBuilder {
    lineage: LineageContext,
    fee: u64,
    issue_satoshis: u64,
    transfer_satoshis: u64,
}

impl TransitionBuilder {
    pub fn new(lineage: LineageContext, config: &TransitionConfig) -> Self {
        Self {
            lineage,
            fee: config.fee,
            issue_satoshis: config.issue_satoshis,
            transfer_satoshis: config.transfer_satoshis,
        }
    }

    pub fn lineage(&self) -> &LineageContext {
        &self.lineage
    }

    fn plan(
        &self,
        operation: Operation,
        consumed: Vec<ConsumedOutput>,
        produced: Vec<ProducedOutput>,
    ) -> TransitionPlan {
        let plan = TransitionPlan::new(operation, consumed, produced, self.fee);
        info!(
            "Built {} plan: {} consumed, {} produced, funding needed {} sats",
            operation,
            plan.consumed.len(),
            plan.produced.len(),
            plan.fee_hint.funding_needed()
        );
        plan
    }

    fn token(&self, payload: NftPayload, satoshis: u64) -> ProducedOutput {
        ProducedOutput::Token(self.lineage.output(payload, satoshis).into())
    }

    /// Check lineage membership and return the consumed payload
    fn member<'a>(&self, spent: &'a SpentToken<NftPayload>) -> TokenResult<&'a NftPayload> {
        self.lineage.ensure_member(&spent.output)?;
        Ok(&spent.output.payload)
    }

    /// Spend the origin outpoint and create the first issue output
    pub fn genesis(
        &self,
        origin: OutPoint,
        origin_satoshis: u64,
        origin_script: ScriptBuf,
        issuer_pkh: PubkeyHash,
    ) -> TokenResult<TransitionPlan> {
        let binding = self.lineage.genesis;
        if origin != binding.origin_outpoint() {
            return Err(TokenError::mismatch(
                "origin_outpoint",
                binding.origin_outpoint(),
                origin,
            ));
        }
        // The issue output leads the genesis transaction's outputs
        if binding.issue_output_index != 0 {
            return Err(TokenError::mismatch(
                "issue_output_index",
                0,
                binding.issue_output_index,
            ));
        }

        let issue = self.token(
            NftPayload::Issue {
                owner_pkh: issuer_pkh,
                token_id: 0,
            },
            self.issue_satoshis,
        );
        Ok(self.plan(
            Operation::Genesis,
            vec![ConsumedOutput::plain(origin, origin_satoshis, origin_script)],
            vec![issue],
        ))
    }

    /// Hand out the issue output's token id to `receiver` and continue issuance
    /// with `next_token_id`, which must be exactly one more
    pub fn issue(
        &self,
        prev: &SpentToken<NftPayload>,
        next_token_id: u64,
        receiver: PubkeyHash,
    ) -> TokenResult<TransitionPlan> {
        let (issuer, token_id) = match self.member(prev)? {
            NftPayload::Issue {
                owner_pkh,
                token_id,
            } => (*owner_pkh, *token_id),
            other => return Err(wrong_state("issue", other)),
        };

        let expected = token_id
            .checked_add(1)
            .ok_or_else(|| TokenError::mismatch("token_id", "a successor id", "u64 overflow"))?;
        if next_token_id != expected {
            return Err(TokenError::mismatch("token_id", expected, next_token_id));
        }

        let continuation = self.token(
            NftPayload::Issue {
                owner_pkh: issuer,
                token_id: next_token_id,
            },
            self.issue_satoshis,
        );
        let issued = self.token(
            NftPayload::Transfer {
                owner_pkh: receiver,
                token_id,
            },
            self.transfer_satoshis,
        );
        Ok(self.plan(
            Operation::Issue,
            vec![consumed_nft(prev)],
            vec![continuation, issued],
        ))
    }

    pub fn transfer(
        &self,
        prev: &SpentToken<NftPayload>,
        receiver: PubkeyHash,
    ) -> TokenResult<TransitionPlan> {
        let token_id = match self.member(prev)? {
            NftPayload::Transfer { token_id, .. } => *token_id,
            other => return Err(wrong_state("transfer", other)),
        };
        let produced = self.token(
            NftPayload::Transfer {
                owner_pkh: receiver,
                token_id,
            },
            self.transfer_satoshis,
        );
        Ok(self.plan(Operation::Transfer, vec![consumed_nft(prev)], vec![produced]))
    }

    /// Offer the token for `counterparty_amount` units of the fungible lineage
    /// identified by `counterparty_genesis_hash`
    pub fn make_swap(
        &self,
        prev: &SpentToken<NftPayload>,
        counterparty_genesis_hash: [u8; 32],
        counterparty_amount: u64,
    ) -> TokenResult<TransitionPlan> {
        let (owner_pkh, token_id) = match self.member(prev)? {
            NftPayload::Transfer {
                owner_pkh,
                token_id,
            } => (*owner_pkh, *token_id),
            other => return Err(wrong_state("transfer", other)),
        };
        let produced = self.token(
            NftPayload::Swap {
                owner_pkh,
                token_id,
                counterparty_genesis_hash,
                counterparty_amount,
            },
            self.transfer_satoshis,
        );
        Ok(self.plan(Operation::MakeSwap, vec![consumed_nft(prev)], vec![produced]))
    }

    pub fn cancel_swap(&self, prev: &SpentToken<NftPayload>) -> TokenResult<TransitionPlan> {
        let (owner_pkh, token_id) = match self.member(prev)? {
            NftPayload::Swap {
                owner_pkh,
                token_id,
                ..
            } => (*owner_pkh, *token_id),
            other => return Err(wrong_state("swap", other)),
        };
        let produced = self.token(
            NftPayload::Transfer {
                owner_pkh,
                token_id,
            },
            self.transfer_satoshis,
        );
        Ok(self.plan(
            Operation::CancelSwap,
            vec![consumed_nft(prev)],
            vec![produced],
        ))
    }

    /// Take a standing swap offer by paying with fungible tokens of the named lineage
    ///
    /// The taker is the owner of `payment`. Outputs: the NFT to the taker, the asked
    /// amount to the maker, and any remainder back to the taker.
    pub fn complete_swap(
        &self,
        prev: &SpentToken<NftPayload>,
        fungible_lineage: &LineageContext,
        payment: &SpentToken<FungiblePayload>,
    ) -> TokenResult<TransitionPlan> {
        let (maker, token_id, wanted_hash, wanted_amount) = match self.member(prev)? {
            NftPayload::Swap {
                owner_pkh,
                token_id,
                counterparty_genesis_hash,
                counterparty_amount,
            } => (
                *owner_pkh,
                *token_id,
                *counterparty_genesis_hash,
                *counterparty_amount,
            ),
            other => return Err(wrong_state("swap", other)),
        };

        fungible_lineage.ensure_member(&payment.output)?;
        let identity = fungible_lineage.identity_hash();
        if identity != wanted_hash {
            return Err(TokenError::mismatch(
                "counterparty_genesis_hash",
                hex::encode(wanted_hash),
                hex::encode(identity),
            ));
        }

        let (taker, amount) = match &payment.output.payload {
            FungiblePayload::Transfer { owner_pkh, amount } => (*owner_pkh, *amount),
            other => return Err(wrong_state("transfer", other)),
        };
        if amount < wanted_amount {
            return Err(TokenError::mismatch(
                "counterparty_amount",
                format!("at least {}", wanted_amount),
                amount,
            ));
        }

        let mut produced = vec![
            self.token(
                NftPayload::Transfer {
                    owner_pkh: taker,
                    token_id,
                },
                self.transfer_satoshis,
            ),
            ProducedOutput::Token(
                fungible_lineage
                    .output(
                        FungiblePayload::Transfer {
                            owner_pkh: maker,
                            amount: wanted_amount,
                        },
                        self.transfer_satoshis,
                    )
                    .into(),
            ),
        ];
        let rest = amount - wanted_amount;
        if rest > 0 {
            produced.push(ProducedOutput::Token(
                fungible_lineage
                    .output(
                        FungiblePayload::Transfer {
                            owner_pkh: taker,
                            amount: rest,
                        },
                        self.transfer_satoshis,
                    )
                    .into(),
            ));
        }

        Ok(self.plan(
            Operation::CompleteSwap,
            vec![consumed_nft(prev), consumed_fungible(payment)],
            produced,
        ))
    }

    pub fn sell(
        &self,
        prev: &SpentToken<NftPayload>,
        ask_satoshis: u64,
    ) -> TokenResult<TransitionPlan> {
        let (owner_pkh, token_id) = match self.member(prev)? {
            NftPayload::Transfer {
                owner_pkh,
                token_id,
            } => (*owner_pkh, *token_id),
            other => return Err(wrong_state("transfer", other)),
        };
        let produced = self.token(
            NftPayload::Sell {
                owner_pkh,
                token_id,
                ask_satoshis,
            },
            self.transfer_satoshis,
        );
        Ok(self.plan(Operation::Sell, vec![consumed_nft(prev)], vec![produced]))
    }

    pub fn cancel_sell(&self, prev: &SpentToken<NftPayload>) -> TokenResult<TransitionPlan> {
        let (owner_pkh, token_id) = match self.member(prev)? {
            NftPayload::Sell {
                owner_pkh,
                token_id,
                ..
            } => (*owner_pkh, *token_id),
            other => return Err(wrong_state("sell", other)),
        };
        let produced = self.token(
            NftPayload::Transfer {
                owner_pkh,
                token_id,
            },
            self.transfer_satoshis,
        );
        Ok(self.plan(
            Operation::CancelSell,
            vec![consumed_nft(prev)],
            vec![produced],
        ))
    }

    /// Satisfy a standing sell order
    ///
    /// The seller is credited `ask + value of the sell output`; the buyer receives
    /// the token in a new output carrying `buyer_satoshis`.
    pub fn buy(
        &self,
        prev: &SpentToken<NftPayload>,
        buyer: PubkeyHash,
        buyer_satoshis: u64,
    ) -> TokenResult<TransitionPlan> {
        let (seller, token_id, ask) = match self.member(prev)? {
            NftPayload::Sell {
                owner_pkh,
                token_id,
                ask_satoshis,
            } => (*owner_pkh, *token_id, *ask_satoshis),
            other => return Err(wrong_state("sell", other)),
        };
        let credited = ask.checked_add(prev.output.satoshis).ok_or_else(|| {
            TokenError::mismatch("ask_satoshis", "a payable ask", "u64 overflow")
        })?;

        let produced = vec![
            self.token(
                NftPayload::Transfer {
                    owner_pkh: buyer,
                    token_id,
                },
                buyer_satoshis,
            ),
            ProducedOutput::Payment {
                pkh: seller,
                satoshis: credited,
            },
        ];
        Ok(self.plan(Operation::Buy, vec![consumed_nft(prev)], produced))
    }

    /// Remove the token from circulation; only change remains
    pub fn burn(&self, prev: &SpentToken<NftPayload>) -> TokenResult<TransitionPlan> {
        match self.member(prev)? {
            NftPayload::Transfer { .. } => {}
            other => return Err(wrong_state("transfer", other)),
        }
        Ok(self.plan(Operation::Burn, vec![consumed_nft(prev)], Vec::new()))
    }
}
