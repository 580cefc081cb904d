//! End-to-end transition scenarios
//!
//! Each scenario runs builder, assembly, authorization and local verification the
//! way the CLI does, minus the network. Tampered variants edit the plan before
//! assembly so that every bundle is well formed and only the covenant clause under
//! test can fail.

use bitcoin::ScriptBuf;

use covenant_token::authorizer::{verify, Authorizer, SigningContext, UnlockBundle};
use covenant_token::errors::{AuthorizationClause, TokenError};
use covenant_token::genesis::GenesisBinding;
use covenant_token::lineage::LineageContext;
use covenant_token::oracle::SpendProof;
use covenant_token::payload::NftPayload;
use covenant_token::transition::{
    assemble, AnyTokenOutput, Operation, ProducedOutput, SpentToken, TransitionPlan,
    UnsignedTransition,
};

use crate::common::fixtures::{
    alice, attested_proof, bob, builder, funding_for, issuer, nft_lineage, proof_for, spent_nft,
    txid, NFT_CODE,
};

/// Assemble, authorize and verify in one go
fn run(
    plan: TransitionPlan,
    funder: &SigningContext,
    signer: Option<&SigningContext>,
    proofs: &[SpendProof],
) -> Result<(UnsignedTransition, Vec<UnlockBundle>), TokenError> {
    let unsigned = assemble(plan, funding_for(funder, 60_000), funder.pubkey_hash())?;
    let bundles = Authorizer::new().authorize(&unsigned, signer, proofs)?;
    verify(&unsigned, &bundles)?;
    Ok((unsigned, bundles))
}

fn expect_clause(result: Result<impl std::fmt::Debug, TokenError>, clause: AuthorizationClause) {
    match result {
        Err(err) => assert_eq!(err.clause(), Some(clause), "unexpected error {}", err),
        Ok(value) => panic!("expected {:?}, transition verified: {:?}", clause, value),
    }
}

fn held_by_alice(byte: u8, token_id: u64) -> SpentToken<NftPayload> {
    spent_nft(
        byte,
        NftPayload::Transfer {
            owner_pkh: alice().pubkey_hash(),
            token_id,
        },
    )
}

#[test]
fn test_genesis_binds_origin() {
    let lineage = nft_lineage();
    let plan = builder()
        .genesis(
            lineage.genesis.origin_outpoint(),
            20_000,
            ScriptBuf::new_p2pkh(&issuer().pubkey_hash()),
            issuer().pubkey_hash(),
        )
        .unwrap();
    let (unsigned, bundles) = run(plan, &issuer(), Some(&issuer()), &[]).unwrap();

    // Genesis consumes no token, so nothing needs unlocking by the assembler
    assert!(bundles.is_empty());
    assert_eq!(unsigned.tx.input.len(), 2);
    let funded = Authorizer::new()
        .sign_funding_inputs(&unsigned, &issuer())
        .unwrap();
    assert!(funded.input.iter().all(|input| !input.script_sig.is_empty()));

    let elsewhere = builder().genesis(
        bitcoin::OutPoint::new(txid(0x01), 0),
        20_000,
        ScriptBuf::new_p2pkh(&issuer().pubkey_hash()),
        issuer().pubkey_hash(),
    );
    assert!(matches!(
        elsewhere,
        Err(TokenError::LineageMismatch {
            field: "origin_outpoint",
            ..
        })
    ));
}

#[test]
fn test_issue_requires_issuer() {
    let prev = spent_nft(
        0x01,
        NftPayload::Issue {
            owner_pkh: issuer().pubkey_hash(),
            token_id: 4,
        },
    );
    let plan = builder().issue(&prev, 5, alice().pubkey_hash()).unwrap();
    let proofs = [proof_for(txid(0x01))];

    let (_, bundles) = run(plan.clone(), &issuer(), Some(&issuer()), &proofs).unwrap();
    assert_eq!(bundles[0].args.receiver_pkh, Some(alice().pubkey_hash()));

    expect_clause(
        run(plan, &issuer(), Some(&alice()), &proofs),
        AuthorizationClause::WrongSigner,
    );
}

#[test]
fn test_issue_must_advance_token_id() {
    let prev = spent_nft(
        0x01,
        NftPayload::Issue {
            owner_pkh: issuer().pubkey_hash(),
            token_id: 4,
        },
    );
    assert!(builder().issue(&prev, 4, alice().pubkey_hash()).is_err());

    let mut plan = builder().issue(&prev, 5, alice().pubkey_hash()).unwrap();
    plan.produced[0] = ProducedOutput::Token(
        nft_lineage()
            .output(
                NftPayload::Issue {
                    owner_pkh: issuer().pubkey_hash(),
                    token_id: 4,
                },
                plan.produced[0].satoshis(),
            )
            .into(),
    );
    expect_clause(
        run(plan, &issuer(), Some(&issuer()), &[proof_for(txid(0x01))]),
        AuthorizationClause::StaleTokenId,
    );
}

#[test]
fn test_transfer_cannot_change_token_id() {
    let prev = held_by_alice(0x02, 7);
    let mut plan = builder().transfer(&prev, bob().pubkey_hash()).unwrap();
    plan.produced[0] = ProducedOutput::Token(
        nft_lineage()
            .output(
                NftPayload::Transfer {
                    owner_pkh: bob().pubkey_hash(),
                    token_id: 8,
                },
                plan.produced[0].satoshis(),
            )
            .into(),
    );
    expect_clause(
        run(plan, &alice(), Some(&alice()), &[proof_for(txid(0x02))]),
        AuthorizationClause::StaleTokenId,
    );
}

#[test]
fn test_outputs_of_a_foreign_lineage_are_rejected() {
    let prev = held_by_alice(0x03, 7);
    let mut plan = builder().transfer(&prev, bob().pubkey_hash()).unwrap();
    let foreign = LineageContext::new(
        ScriptBuf::from_bytes(NFT_CODE.to_vec()),
        GenesisBinding::bind_default(txid(0xee), 0),
    );
    plan.produced[0] = ProducedOutput::Token(
        foreign
            .output(
                NftPayload::Transfer {
                    owner_pkh: bob().pubkey_hash(),
                    token_id: 7,
                },
                plan.produced[0].satoshis(),
            )
            .into(),
    );
    expect_clause(
        run(plan, &alice(), Some(&alice()), &[proof_for(txid(0x03))]),
        AuthorizationClause::WrongGenesis,
    );
}

#[test]
fn test_sell_then_buy() {
    let held = held_by_alice(0x04, 9);
    let sell = builder().sell(&held, 30_000).unwrap();
    let (_, bundles) = run(sell.clone(), &alice(), Some(&alice()), &[proof_for(txid(0x04))])
        .unwrap();
    assert_eq!(bundles.len(), 1);

    let order = match sell.produced_tokens().next().and_then(AnyTokenOutput::as_nft) {
        Some(output) => SpentToken::new(
            bitcoin::OutPoint::new(txid(0x05), 0),
            output.clone(),
        ),
        None => panic!("sell produced no NFT"),
    };
    let buy = builder().buy(&order, bob().pubkey_hash(), 5_000).unwrap();

    // Anyone may take the order; the buyer only funds it
    let (unsigned, bundles) = run(buy.clone(), &bob(), None, &[proof_for(txid(0x05))]).unwrap();
    assert_eq!(bundles[0].signature, None);
    assert_eq!(unsigned.tx.output[1].value.to_sat(), 30_000 + order.output.satoshis);

    let mut underpaid = buy;
    underpaid.produced[1] = ProducedOutput::Payment {
        pkh: alice().pubkey_hash(),
        satoshis: 30_000,
    };
    expect_clause(
        run(underpaid, &bob(), None, &[proof_for(txid(0x05))]),
        AuthorizationClause::WrongPayment,
    );
}

#[test]
fn test_swap_offer_lifecycle() {
    let held = held_by_alice(0x06, 2);
    let offer = builder().make_swap(&held, [0x5a; 32], 100).unwrap();
    let (_, bundles) =
        run(offer.clone(), &alice(), Some(&alice()), &[proof_for(txid(0x06))]).unwrap();
    assert_eq!(bundles[0].operation, Operation::MakeSwap);

    let standing = SpentToken::new(
        bitcoin::OutPoint::new(txid(0x07), 0),
        offer
            .produced_tokens()
            .find_map(AnyTokenOutput::as_nft)
            .cloned()
            .unwrap(),
    );
    let cancel = builder().cancel_swap(&standing).unwrap();
    run(cancel.clone(), &alice(), Some(&alice()), &[proof_for(txid(0x07))]).unwrap();
    expect_clause(
        run(cancel, &alice(), Some(&bob()), &[proof_for(txid(0x07))]),
        AuthorizationClause::WrongSigner,
    );
}

#[test]
fn test_burn_needs_owner_but_no_proof() {
    let held = held_by_alice(0x08, 1);
    let plan = builder().burn(&held).unwrap();

    let (unsigned, bundles) = run(plan.clone(), &alice(), Some(&alice()), &[]).unwrap();
    assert_eq!(bundles[0].proof, None);
    assert_eq!(bundles[0].args.receiver_pkh, None);
    // Funding plus the burnt output, less the fee, returns as change
    assert_eq!(unsigned.tx.output.len(), 1);
    assert_eq!(unsigned.change_amount, 60_000 + 5_000 - 10_000);

    expect_clause(
        run(plan, &alice(), Some(&bob()), &[]),
        AuthorizationClause::WrongSigner,
    );
}

#[test]
fn test_proof_must_answer_for_the_consumed_output() {
    let held = held_by_alice(0x09, 3);
    let plan = builder().transfer(&held, bob().pubkey_hash()).unwrap();

    expect_clause(
        run(plan.clone(), &alice(), Some(&alice()), &[]),
        AuthorizationClause::MissingProof,
    );
    expect_clause(
        run(plan.clone(), &alice(), Some(&alice()), &[proof_for(txid(0x0a))]),
        AuthorizationClause::ProofMismatch,
    );
    // Extra proofs for unrelated transactions are ignored
    run(
        plan,
        &alice(),
        Some(&alice()),
        &[proof_for(txid(0x0a)), proof_for(txid(0x09))],
    )
    .unwrap();
}

#[test]
fn test_attestation_for_other_spender_of_same_output_is_refused() {
    // Both proofs attest outpoint(0x99, 0); only one names the creator of the held NFT
    let held = held_by_alice(0x0c, 3);
    let plan = builder().transfer(&held, bob().pubkey_hash()).unwrap();
    let genuine = attested_proof(txid(0x0c), txid(0x0c));
    let other_spender = attested_proof(txid(0x0c), txid(0x0d));
    assert_eq!(genuine.key, other_spender.key);

    expect_clause(
        run(plan.clone(), &alice(), Some(&alice()), &[other_spender.clone()]),
        AuthorizationClause::ProofMismatch,
    );
    let (_, bundles) = run(plan, &alice(), Some(&alice()), &[other_spender, genuine.clone()])
        .unwrap();
    assert_eq!(bundles[0].proof.as_ref(), Some(&genuine));
}

#[test]
fn test_fee_is_conserved() {
    let held = held_by_alice(0x0b, 3);
    let plan = builder().transfer(&held, bob().pubkey_hash()).unwrap();

    let (unsigned, _) = run(plan.clone(), &alice(), Some(&alice()), &[proof_for(txid(0x0b))])
        .unwrap();
    assert_eq!(unsigned.fee(), 10_000);
    assert_eq!(
        unsigned.total_input(),
        unsigned.total_output() + unsigned.fee()
    );

    let err = assemble(plan, funding_for(&alice(), 4_999), alice().pubkey_hash()).unwrap_err();
    assert!(matches!(
        err,
        TokenError::InsufficientFunds {
            needed: 15_000,
            available: 9_999,
        }
    ));
}
