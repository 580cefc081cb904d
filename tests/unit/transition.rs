//! Tests for the per-operation plan builders

use bitcoin::ScriptBuf;

use covenant_token::config::TransitionConfig;
use covenant_token::errors::TokenError;
use covenant_token::genesis::GenesisBinding;
use covenant_token::lineage::LineageContext;
use covenant_token::payload::{FungiblePayload, NftPayload};
use covenant_token::transition::{AnyTokenOutput, Operation, ProducedOutput, SpentToken};

use crate::common::fixtures::{
    alice, bob, builder, fungible_lineage, issuer, nft_lineage, outpoint, spent_nft, txid,
};

fn nft_outputs(produced: &[ProducedOutput]) -> Vec<NftPayload> {
    produced
        .iter()
        .filter_map(ProducedOutput::as_token)
        .filter_map(AnyTokenOutput::as_nft)
        .map(|output| output.payload.clone())
        .collect()
}

fn swap_offer(amount: u64) -> SpentToken<NftPayload> {
    spent_nft(
        0x40,
        NftPayload::Swap {
            owner_pkh: alice().pubkey_hash(),
            token_id: 3,
            counterparty_genesis_hash: fungible_lineage().identity_hash(),
            counterparty_amount: amount,
        },
    )
}

fn fungible_payment(amount: u64) -> SpentToken<FungiblePayload> {
    SpentToken::new(
        outpoint(0x41, 2),
        fungible_lineage().output(
            FungiblePayload::Transfer {
                owner_pkh: bob().pubkey_hash(),
                amount,
            },
            5_000,
        ),
    )
}

#[test]
fn test_issue_produces_continuation_then_token() {
    let prev = spent_nft(
        0x01,
        NftPayload::Issue {
            owner_pkh: issuer().pubkey_hash(),
            token_id: 0,
        },
    );
    let plan = builder().issue(&prev, 1, alice().pubkey_hash()).unwrap();

    assert_eq!(plan.operation, Operation::Issue);
    assert_eq!(
        nft_outputs(&plan.produced),
        vec![
            NftPayload::Issue {
                owner_pkh: issuer().pubkey_hash(),
                token_id: 1,
            },
            NftPayload::Transfer {
                owner_pkh: alice().pubkey_hash(),
                token_id: 0,
            },
        ]
    );
    let config = TransitionConfig::default();
    assert_eq!(plan.produced[0].satoshis(), config.issue_satoshis);
    assert_eq!(plan.produced[1].satoshis(), config.transfer_satoshis);
}

#[test]
fn test_genesis_is_copied_unchanged_through_a_lineage() {
    let b = builder();
    let lineage = nft_lineage();
    let origin = lineage.genesis.origin_outpoint();

    let genesis = b
        .genesis(
            origin,
            20_000,
            ScriptBuf::new_p2pkh(&issuer().pubkey_hash()),
            issuer().pubkey_hash(),
        )
        .unwrap();
    let issue_output = genesis.produced_tokens().next().unwrap().clone();
    let issue_prev = SpentToken::new(outpoint(0x02, 0), issue_output.as_nft().unwrap().clone());

    let issued = b.issue(&issue_prev, 1, alice().pubkey_hash()).unwrap();
    let token = issued.produced_tokens().nth(1).unwrap().as_nft().unwrap().clone();
    let transfer = b
        .transfer(&SpentToken::new(outpoint(0x03, 1), token), bob().pubkey_hash())
        .unwrap();
    let sold = b
        .sell(
            &SpentToken::new(
                outpoint(0x04, 0),
                transfer.produced_tokens().next().unwrap().as_nft().unwrap().clone(),
            ),
            10_000,
        )
        .unwrap();

    for plan in [&genesis, &issued, &transfer, &sold] {
        for token in plan.produced_tokens() {
            assert_eq!(*token.genesis(), lineage.genesis);
            assert_eq!(token.code_part(), &lineage.code_part);
        }
    }
}

#[test]
fn test_token_id_preserved_by_non_issue_operations() {
    let b = builder();
    let held = spent_nft(
        0x05,
        NftPayload::Transfer {
            owner_pkh: alice().pubkey_hash(),
            token_id: 42,
        },
    );
    let plans = [
        b.transfer(&held, bob().pubkey_hash()).unwrap(),
        b.sell(&held, 1_000).unwrap(),
        b.make_swap(&held, [7; 32], 10).unwrap(),
    ];
    for plan in &plans {
        for payload in nft_outputs(&plan.produced) {
            assert_eq!(payload.token_id(), 42);
            assert_eq!(
                payload.owner(),
                if plan.operation == Operation::Transfer {
                    bob().pubkey_hash()
                } else {
                    alice().pubkey_hash()
                }
            );
        }
    }
}

#[test]
fn test_buy_pays_seller_ask_plus_sell_output() -> anyhow::Result<()> {
    let sell = spent_nft(
        0x06,
        NftPayload::Sell {
            owner_pkh: alice().pubkey_hash(),
            token_id: 9,
            ask_satoshis: 30_000,
        },
    );
    let plan = builder().buy(&sell, bob().pubkey_hash(), 6_000)?;

    assert_eq!(
        plan.produced[1],
        ProducedOutput::Payment {
            pkh: alice().pubkey_hash(),
            satoshis: 30_000 + sell.output.satoshis,
        }
    );
    assert_eq!(plan.produced[0].satoshis(), 6_000);
    assert_eq!(plan.fee_hint.consumed_satoshis, sell.output.satoshis);
    Ok(())
}

#[test]
fn test_burn_produces_nothing() {
    let held = spent_nft(
        0x07,
        NftPayload::Transfer {
            owner_pkh: alice().pubkey_hash(),
            token_id: 1,
        },
    );
    let plan = builder().burn(&held).unwrap();
    assert!(plan.produced.is_empty());
    assert_eq!(plan.fee_hint.funding_needed(), TransitionConfig::default().fee - 5_000);
}

#[test]
fn test_complete_swap_settles_both_lineages() -> anyhow::Result<()> {
    let plan = builder().complete_swap(
        &swap_offer(600),
        &fungible_lineage(),
        &fungible_payment(1_000),
    )?;

    assert_eq!(plan.consumed.len(), 2);
    assert_eq!(
        nft_outputs(&plan.produced),
        vec![NftPayload::Transfer {
            owner_pkh: bob().pubkey_hash(),
            token_id: 3,
        }]
    );
    let fungible: Vec<FungiblePayload> = plan
        .produced_tokens()
        .filter_map(AnyTokenOutput::as_fungible)
        .map(|output| output.payload.clone())
        .collect();
    assert_eq!(
        fungible,
        vec![
            FungiblePayload::Transfer {
                owner_pkh: alice().pubkey_hash(),
                amount: 600,
            },
            FungiblePayload::Transfer {
                owner_pkh: bob().pubkey_hash(),
                amount: 400,
            },
        ]
    );
    Ok(())
}

#[test]
fn test_complete_swap_exact_amount_has_no_remainder() {
    let plan = builder()
        .complete_swap(&swap_offer(1_000), &fungible_lineage(), &fungible_payment(1_000))
        .unwrap();
    assert_eq!(plan.produced.len(), 2);
}

#[test]
fn test_complete_swap_rejects_wrong_payment() {
    let b = builder();
    let err = b
        .complete_swap(&swap_offer(2_000), &fungible_lineage(), &fungible_payment(1_000))
        .unwrap_err();
    assert!(matches!(
        err,
        TokenError::LineageMismatch {
            field: "counterparty_amount",
            ..
        }
    ));

    let other = LineageContext::new(
        fungible_lineage().code_part,
        GenesisBinding::bind_default(txid(0xf1), 1),
    );
    let payment = SpentToken::new(
        outpoint(0x41, 2),
        other.output(
            FungiblePayload::Transfer {
                owner_pkh: bob().pubkey_hash(),
                amount: 5_000,
            },
            5_000,
        ),
    );
    let err = b
        .complete_swap(&swap_offer(600), &other, &payment)
        .unwrap_err();
    assert!(matches!(
        err,
        TokenError::LineageMismatch {
            field: "counterparty_genesis_hash",
            ..
        }
    ));
}
