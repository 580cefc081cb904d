//! Local covenant check
//!
//! Re-derives what the on-chain covenant would enforce for a transition and its
//! unlock bundles, failing with the first violated [`AuthorizationClause`]. A
//! transition that passes here may still be rejected by a node; one that fails
//! here never reaches the network.

use bitcoin::secp256k1::{ecdsa::Signature, Message, Secp256k1, VerifyOnly};
use bitcoin::{OutPoint, TxOut};
use tracing::debug;

use super::{input_requirement, sighash, UnlockBundle, TOKEN_SIGHASH_TYPE};
use crate::errors::{AuthorizationClause, TokenError, TokenResult};
use crate::genesis::code_with_genesis_hash;
use crate::output::TokenOutput;
use crate::payload::{FungiblePayload, NftPayload, PayloadCodec};
use crate::transition::{
    AnyTokenOutput, ConsumedOutput, Operation, ProducedOutput, TransitionPlan, UnsignedTransition,
};

fn fail(clause: AuthorizationClause, detail: impl Into<String>) -> TokenError {
    TokenError::unauthorized(clause, detail)
}

/// Check `unsigned` and its `bundles` against every covenant clause
pub fn verify(unsigned: &UnsignedTransition, bundles: &[UnlockBundle]) -> TokenResult<()> {
    check_inputs(unsigned)?;
    check_outputs(unsigned)?;
    check_bundles(unsigned, bundles)?;
    check_lineage(&unsigned.plan)?;
    debug!(
        "Verified {} transition {} against {} unlock bundles",
        unsigned.plan.operation,
        unsigned.txid(),
        bundles.len()
    );
    Ok(())
}

fn check_inputs(unsigned: &UnsignedTransition) -> TokenResult<()> {
    let expected: Vec<OutPoint> = unsigned
        .funding
        .iter()
        .map(|f| f.outpoint)
        .chain(unsigned.plan.consumed.iter().map(|c| c.outpoint))
        .collect();
    let actual: Vec<OutPoint> = unsigned
        .tx
        .input
        .iter()
        .map(|i| i.previous_output)
        .collect();
    if expected != actual {
        return Err(fail(
            AuthorizationClause::WrongInput,
            "transaction inputs differ from the funded plan",
        ));
    }
    Ok(())
}

fn check_outputs(unsigned: &UnsignedTransition) -> TokenResult<()> {
    let produced: Vec<TxOut> = unsigned
        .plan
        .produced
        .iter()
        .map(ProducedOutput::to_txout)
        .collect();
    let outputs = &unsigned.tx.output;
    if outputs.len() < produced.len() || outputs[..produced.len()] != produced[..] {
        return Err(fail(
            AuthorizationClause::UnexpectedTokenOutput,
            "transaction outputs differ from the plan's produced outputs",
        ));
    }

    let change = &outputs[produced.len()..];
    let change_ok = match change {
        [] => unsigned.change_amount == 0,
        [out] => {
            unsigned.change_amount > 0
                && out.value.to_sat() == unsigned.change_amount
                && out.script_pubkey == bitcoin::ScriptBuf::new_p2pkh(&unsigned.change_pkh)
        }
        _ => false,
    };
    if !change_ok {
        return Err(fail(
            AuthorizationClause::FeeMismatch,
            format!(
                "expected a single change output of {} sats to {}",
                unsigned.change_amount, unsigned.change_pkh
            ),
        ));
    }

    let spent = unsigned.total_output().checked_add(unsigned.fee());
    if spent != Some(unsigned.total_input()) {
        return Err(fail(
            AuthorizationClause::FeeMismatch,
            format!(
                "inputs {} sats != outputs {} sats + fee {} sats",
                unsigned.total_input(),
                unsigned.total_output(),
                unsigned.fee()
            ),
        ));
    }
    Ok(())
}

fn check_bundles(unsigned: &UnsignedTransition, bundles: &[UnlockBundle]) -> TokenResult<()> {
    let operation = unsigned.plan.operation;
    let token_inputs: Vec<(usize, &ConsumedOutput, &AnyTokenOutput)> = unsigned
        .consumed_inputs()
        .filter_map(|(index, consumed)| consumed.token.as_ref().map(|t| (index, consumed, t)))
        .collect();

    for (position, bundle) in bundles.iter().enumerate() {
        if !token_inputs.iter().any(|(index, ..)| *index == bundle.input_index) {
            return Err(fail(
                AuthorizationClause::WrongInput,
                format!("bundle for input {} which holds no token", bundle.input_index),
            ));
        }
        if bundles[..position]
            .iter()
            .any(|earlier| earlier.input_index == bundle.input_index)
        {
            return Err(fail(
                AuthorizationClause::WrongInput,
                format!("duplicate bundle for input {}", bundle.input_index),
            ));
        }
        if bundle.operation != operation {
            return Err(fail(
                AuthorizationClause::WrongInput,
                format!(
                    "bundle for {} on a {} transition",
                    bundle.operation, operation
                ),
            ));
        }
    }

    let secp = Secp256k1::verification_only();
    for (index, consumed, token) in token_inputs {
        let bundle = bundles
            .iter()
            .find(|b| b.input_index == index)
            .ok_or_else(|| {
                fail(
                    AuthorizationClause::WrongInput,
                    format!("no unlock bundle for token input {}", index),
                )
            })?;
        check_bundle(&secp, unsigned, index, consumed, token, bundle)?;
    }
    Ok(())
}

fn check_bundle(
    secp: &Secp256k1<VerifyOnly>,
    unsigned: &UnsignedTransition,
    index: usize,
    consumed: &ConsumedOutput,
    token: &AnyTokenOutput,
    bundle: &UnlockBundle,
) -> TokenResult<()> {
    let requirement = input_requirement(unsigned.plan.operation, token);
    let preimage = sighash::preimage(
        &unsigned.tx,
        index,
        &consumed.script_pubkey,
        consumed.satoshis,
        TOKEN_SIGHASH_TYPE,
    )?;
    if bundle.preimage != preimage {
        return Err(fail(
            AuthorizationClause::InvalidSignature,
            format!("preimage of input {} does not commit to this transaction", index),
        ));
    }

    if let Some(owner) = requirement.signer {
        let (signature, public_key) = match (&bundle.signature, bundle.public_key) {
            (Some(signature), Some(public_key)) => (signature, public_key),
            _ => {
                return Err(fail(
                    AuthorizationClause::WrongSigner,
                    format!("input {} carries no signature from {}", index, owner),
                ))
            }
        };
        if public_key.pubkey_hash() != owner {
            return Err(fail(
                AuthorizationClause::WrongSigner,
                format!(
                    "input {} signed by {}, owner is {}",
                    index,
                    public_key.pubkey_hash(),
                    owner
                ),
            ));
        }

        let (sighash_byte, der) = signature.split_last().ok_or_else(|| {
            fail(AuthorizationClause::InvalidSignature, "empty signature")
        })?;
        if u32::from(*sighash_byte) != TOKEN_SIGHASH_TYPE {
            return Err(fail(
                AuthorizationClause::InvalidSignature,
                format!(
                    "sighash type {:#04x}, expected {:#04x}",
                    sighash_byte, TOKEN_SIGHASH_TYPE
                ),
            ));
        }
        let signature = Signature::from_der(der).map_err(|e| {
            fail(
                AuthorizationClause::InvalidSignature,
                format!("input {}: {}", index, e),
            )
        })?;
        let message = Message::from_digest(sighash::digest(&preimage));
        secp.verify_ecdsa(&message, &signature, &public_key.inner)
            .map_err(|e| {
                fail(
                    AuthorizationClause::InvalidSignature,
                    format!("input {}: {}", index, e),
                )
            })?;
    }

    if requirement.needs_proof {
        let proof = bundle.proof.as_ref().ok_or_else(|| {
            fail(
                AuthorizationClause::MissingProof,
                format!("input {} has no spend-proof", index),
            )
        })?;
        if proof.key.subject_txid != consumed.outpoint.txid {
            return Err(fail(
                AuthorizationClause::ProofMismatch,
                format!(
                    "proof names spender {}, input {} was created by {}",
                    proof.key.subject_txid, index, consumed.outpoint.txid
                ),
            ));
        }
        proof.check_message(None).map_err(|e| {
            fail(
                AuthorizationClause::ProofMismatch,
                format!("input {}: {}", index, e),
            )
        })?;
    }
    Ok(())
}

fn same_lineage<P, Q>(lineage: &TokenOutput<P>, output: &TokenOutput<Q>) -> TokenResult<()> {
    if output.genesis != lineage.genesis {
        return Err(fail(
            AuthorizationClause::WrongGenesis,
            format!(
                "output names genesis {}, lineage is {}",
                output.genesis, lineage.genesis
            ),
        ));
    }
    if output.code_part != lineage.code_part {
        return Err(fail(
            AuthorizationClause::WrongGenesis,
            "output carries a different code part",
        ));
    }
    Ok(())
}

fn check_lineage(plan: &TransitionPlan) -> TokenResult<()> {
    if plan.operation == Operation::Genesis {
        return check_genesis(plan);
    }

    let nft = plan
        .consumed_tokens()
        .find_map(|(_, token)| token.as_nft())
        .ok_or_else(|| {
            fail(
                AuthorizationClause::WrongInput,
                format!("{} transition consumes no NFT", plan.operation),
            )
        })?;
    let fungible = plan
        .consumed_tokens()
        .find_map(|(_, token)| token.as_fungible());

    let mut produced_nfts = Vec::new();
    for token in plan.produced_tokens() {
        match token {
            AnyTokenOutput::Nft(output) => {
                same_lineage(nft, output)?;
                produced_nfts.push(output);
            }
            AnyTokenOutput::Fungible(output) => {
                let consumed = fungible.ok_or_else(|| {
                    fail(
                        AuthorizationClause::UnexpectedTokenOutput,
                        "fungible output without a fungible input",
                    )
                })?;
                same_lineage(consumed, output)?;
            }
        }
    }

    check_nft_transition(plan, nft, &produced_nfts)
}

fn check_genesis(plan: &TransitionPlan) -> TokenResult<()> {
    let origin = match plan.consumed.as_slice() {
        [origin] if origin.token.is_none() => origin.outpoint,
        _ => {
            return Err(fail(
                AuthorizationClause::WrongInput,
                "genesis spends exactly one plain origin output",
            ))
        }
    };

    let tokens: Vec<&AnyTokenOutput> = plan.produced_tokens().collect();
    let issue = match tokens.as_slice() {
        [AnyTokenOutput::Nft(issue)] => issue,
        _ => {
            return Err(fail(
                AuthorizationClause::UnexpectedTokenOutput,
                "genesis produces a single issue output",
            ))
        }
    };
    if issue.genesis.origin_outpoint() != origin {
        return Err(fail(
            AuthorizationClause::WrongGenesis,
            format!(
                "binding {} does not name the spent origin {}",
                issue.genesis, origin
            ),
        ));
    }
    let position = plan
        .produced
        .iter()
        .position(|p| p.as_token().is_some())
        .unwrap_or_default();
    if issue.genesis.issue_output_index as usize != position {
        return Err(fail(
            AuthorizationClause::WrongGenesis,
            format!(
                "binding places the issue output at {}, it is at {}",
                issue.genesis.issue_output_index, position
            ),
        ));
    }
    match issue.payload {
        NftPayload::Issue { token_id: 0, .. } => Ok(()),
        NftPayload::Issue { token_id, .. } => Err(fail(
            AuthorizationClause::StaleTokenId,
            format!("genesis issue output starts at token id {}", token_id),
        )),
        _ => Err(fail(
            AuthorizationClause::UnexpectedTokenOutput,
            format!("genesis produced a {} output", issue.payload.kind()),
        )),
    }
}

fn check_nft_transition(
    plan: &TransitionPlan,
    prev: &TokenOutput<NftPayload>,
    produced: &[&TokenOutput<NftPayload>],
) -> TokenResult<()> {
    let operation = plan.operation;
    let token_id = prev.payload.token_id();
    let owner = prev.payload.owner();

    if operation == Operation::Burn {
        if plan.produced_tokens().next().is_some() {
            return Err(fail(
                AuthorizationClause::UnexpectedTokenOutput,
                "burn produced a token output",
            ));
        }
        return Ok(());
    }

    if operation == Operation::Issue {
        let [continuation, issued] = produced else {
            return Err(fail(
                AuthorizationClause::UnexpectedTokenOutput,
                "issue produces a continuation and an issued token",
            ));
        };
        match continuation.payload {
            NftPayload::Issue {
                owner_pkh,
                token_id: next,
            } => {
                if owner_pkh != owner {
                    return Err(fail(
                        AuthorizationClause::UnexpectedTokenOutput,
                        "issue continuation changed issuer",
                    ));
                }
                if Some(next) != token_id.checked_add(1) {
                    return Err(fail(
                        AuthorizationClause::StaleTokenId,
                        format!("continuation id {} after {}", next, token_id),
                    ));
                }
            }
            _ => {
                return Err(fail(
                    AuthorizationClause::UnexpectedTokenOutput,
                    "first issue output must continue issuance",
                ))
            }
        }
        return match issued.payload {
            NftPayload::Transfer { token_id: id, .. } if id == token_id => Ok(()),
            NftPayload::Transfer { token_id: id, .. } => Err(fail(
                AuthorizationClause::StaleTokenId,
                format!("issued token id {}, issue output held {}", id, token_id),
            )),
            _ => Err(fail(
                AuthorizationClause::UnexpectedTokenOutput,
                "issued token must be a transfer output",
            )),
        };
    }

    let [next] = produced else {
        return Err(fail(
            AuthorizationClause::UnexpectedTokenOutput,
            format!("{} produces exactly one NFT output", operation),
        ));
    };
    if next.payload.token_id() != token_id {
        return Err(fail(
            AuthorizationClause::StaleTokenId,
            format!("token id {} became {}", token_id, next.payload.token_id()),
        ));
    }
    let expected_kind = match operation {
        Operation::MakeSwap => "swap",
        Operation::Sell => "sell",
        _ => "transfer",
    };
    if next.payload.kind() != expected_kind {
        return Err(fail(
            AuthorizationClause::UnexpectedTokenOutput,
            format!(
                "{} produced a {} output, expected {}",
                operation,
                next.payload.kind(),
                expected_kind
            ),
        ));
    }

    match operation {
        Operation::MakeSwap | Operation::Sell | Operation::CancelSwap | Operation::CancelSell => {
            if next.payload.owner() != owner {
                return Err(fail(
                    AuthorizationClause::UnexpectedTokenOutput,
                    format!("{} changed the owner", operation),
                ));
            }
            Ok(())
        }
        Operation::Buy => check_payment(plan, prev),
        Operation::CompleteSwap => check_swap_settlement(plan, prev, next),
        _ => Ok(()),
    }
}

/// The seller must receive exactly `ask + value of the sell output`
fn check_payment(plan: &TransitionPlan, prev: &TokenOutput<NftPayload>) -> TokenResult<()> {
    let (seller, ask) = match prev.payload {
        NftPayload::Sell {
            owner_pkh,
            ask_satoshis,
            ..
        } => (owner_pkh, ask_satoshis),
        _ => {
            return Err(fail(
                AuthorizationClause::WrongInput,
                "buy consumes a sell output",
            ))
        }
    };
    let expected = ask
        .checked_add(prev.satoshis)
        .ok_or_else(|| fail(AuthorizationClause::WrongPayment, "ask overflows u64"))?;

    let paid = plan.produced.iter().find_map(|p| match p {
        ProducedOutput::Payment { pkh, satoshis } if *pkh == seller => Some(*satoshis),
        _ => None,
    });
    match paid {
        Some(satoshis) if satoshis == expected => Ok(()),
        Some(satoshis) => Err(fail(
            AuthorizationClause::WrongPayment,
            format!("seller credited {} sats, expected {}", satoshis, expected),
        )),
        None => Err(fail(
            AuthorizationClause::WrongPayment,
            format!("no payment output to seller {}", seller),
        )),
    }
}

fn check_swap_settlement(
    plan: &TransitionPlan,
    prev: &TokenOutput<NftPayload>,
    next: &TokenOutput<NftPayload>,
) -> TokenResult<()> {
    let (maker, wanted_hash, wanted_amount) = match prev.payload {
        NftPayload::Swap {
            owner_pkh,
            counterparty_genesis_hash,
            counterparty_amount,
            ..
        } => (owner_pkh, counterparty_genesis_hash, counterparty_amount),
        _ => {
            return Err(fail(
                AuthorizationClause::WrongInput,
                "complete-swap consumes a swap output",
            ))
        }
    };
    let payment = plan
        .consumed_tokens()
        .find_map(|(_, token)| token.as_fungible())
        .ok_or_else(|| {
            fail(
                AuthorizationClause::WrongInput,
                "complete-swap consumes a fungible payment",
            )
        })?;

    let identity = code_with_genesis_hash(payment.code_part.as_bytes(), &payment.genesis);
    if identity != wanted_hash {
        return Err(fail(
            AuthorizationClause::WrongGenesis,
            format!(
                "payment lineage {} is not the requested {}",
                hex::encode(identity),
                hex::encode(wanted_hash)
            ),
        ));
    }

    let taker = payment.payload.owner_pkh();
    if taker != Some(next.payload.owner()) {
        return Err(fail(
            AuthorizationClause::UnexpectedTokenOutput,
            "NFT not delivered to the paying party",
        ));
    }

    let fungible_outputs: Vec<&TokenOutput<FungiblePayload>> = plan
        .produced_tokens()
        .filter_map(AnyTokenOutput::as_fungible)
        .collect();
    let produced_amount = fungible_outputs
        .iter()
        .map(|o| o.payload.amount())
        .try_fold(0u64, u64::checked_add);
    if produced_amount != Some(payment.payload.amount()) {
        return Err(fail(
            AuthorizationClause::UnexpectedTokenOutput,
            "fungible amount not conserved",
        ));
    }

    let to_maker: u64 = fungible_outputs
        .iter()
        .filter(|o| o.payload.owner_pkh() == Some(maker))
        .map(|o| o.payload.amount())
        .sum();
    if to_maker < wanted_amount {
        return Err(fail(
            AuthorizationClause::WrongPayment,
            format!("maker receives {}, asked {}", to_maker, wanted_amount),
        ));
    }
    Ok(())
}
