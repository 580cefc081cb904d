//! Tests for unlock bundle production and the local covenant check
//!
//! Each test builds a real transition with the fixture lineage and then
//! tampers with exactly one element of the result.

use covenant_token::authorizer::{verify, Authorizer, UnlockBundle, TOKEN_SIGHASH_TYPE};
use covenant_token::errors::{AuthorizationClause, TokenError};
use covenant_token::payload::NftPayload;
use covenant_token::transition::{assemble, UnsignedTransition};

use crate::common::fixtures::{
    alice, attested_proof, bob, builder, funding_for, proof_for, spent_nft, txid,
};

fn transfer_from_alice() -> UnsignedTransition {
    let prev = spent_nft(
        0x30,
        NftPayload::Transfer {
            owner_pkh: alice().pubkey_hash(),
            token_id: 7,
        },
    );
    let plan = builder().transfer(&prev, bob().pubkey_hash()).unwrap();
    assemble(plan, funding_for(&alice(), 50_000), alice().pubkey_hash()).unwrap()
}

fn authorized_transfer() -> (UnsignedTransition, Vec<UnlockBundle>) {
    let unsigned = transfer_from_alice();
    let bundles = Authorizer::new()
        .authorize(&unsigned, Some(&alice()), &[proof_for(txid(0x30))])
        .unwrap();
    (unsigned, bundles)
}

fn clause(err: TokenError) -> AuthorizationClause {
    err.clause()
        .unwrap_or_else(|| panic!("expected AuthorizationFailed, got {:?}", err))
}

#[test]
fn test_owner_signature_verifies() {
    let (unsigned, bundles) = authorized_transfer();
    assert_eq!(bundles.len(), 1);

    let bundle = &bundles[0];
    assert_eq!(bundle.input_index, 1);
    assert_eq!(bundle.public_key, Some(alice().public_key()));
    assert_eq!(
        bundle.signature.as_ref().and_then(|s| s.last()).copied(),
        Some(TOKEN_SIGHASH_TYPE as u8)
    );
    assert_eq!(bundle.args.receiver_pkh, Some(bob().pubkey_hash()));
    assert_eq!(bundle.args.change_pkh, alice().pubkey_hash());
    assert_eq!(bundle.args.change_amount, unsigned.change_amount);

    verify(&unsigned, &bundles).unwrap();
}

#[test]
fn test_wrong_signer_is_rejected() {
    let unsigned = transfer_from_alice();
    let authorizer = Authorizer::new();

    let err = authorizer
        .authorize(&unsigned, Some(&bob()), &[proof_for(txid(0x30))])
        .unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::WrongSigner);

    let err = authorizer
        .authorize(&unsigned, None, &[proof_for(txid(0x30))])
        .unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::WrongSigner);
}

#[test]
fn test_proof_pairing() {
    let unsigned = transfer_from_alice();
    let authorizer = Authorizer::new();

    let err = authorizer
        .authorize(&unsigned, Some(&alice()), &[proof_for(txid(0x31))])
        .unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::ProofMismatch);

    let err = authorizer
        .authorize(&unsigned, Some(&alice()), &[])
        .unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::MissingProof);
}

#[test]
fn test_tampered_signature_is_invalid() {
    let (unsigned, mut bundles) = authorized_transfer();
    if let Some(signature) = bundles[0].signature.as_mut() {
        let at = signature.len() - 2;
        signature[at] ^= 0x01;
    }
    let err = verify(&unsigned, &bundles).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::InvalidSignature);
}

#[test]
fn test_wrong_sighash_type_is_invalid() {
    let (unsigned, mut bundles) = authorized_transfer();
    if let Some(signature) = bundles[0].signature.as_mut() {
        if let Some(last) = signature.last_mut() {
            *last = 0x41;
        }
    }
    let err = verify(&unsigned, &bundles).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::InvalidSignature);
}

#[test]
fn test_substituted_public_key_is_wrong_signer() {
    let (unsigned, mut bundles) = authorized_transfer();
    bundles[0].public_key = Some(bob().public_key());
    let err = verify(&unsigned, &bundles).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::WrongSigner);
}

#[test]
fn test_bundle_without_proof_is_missing_proof() {
    let (unsigned, mut bundles) = authorized_transfer();
    bundles[0].proof = None;
    let err = verify(&unsigned, &bundles).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::MissingProof);

    let (unsigned, mut bundles) = authorized_transfer();
    bundles[0].proof = Some(proof_for(txid(0x55)));
    let err = verify(&unsigned, &bundles).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::ProofMismatch);
}

#[test]
fn test_proof_attesting_another_spender_is_mismatch() {
    // Key names the creator of the consumed output, the signed message does not
    let relabelled = attested_proof(txid(0x30), txid(0x31));

    let (unsigned, mut bundles) = authorized_transfer();
    bundles[0].proof = Some(relabelled.clone());
    let err = verify(&unsigned, &bundles).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::ProofMismatch);

    let err = Authorizer::new()
        .authorize(&unsigned, Some(&alice()), &[relabelled])
        .unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::ProofMismatch);
}

#[test]
fn test_missing_and_stray_bundles() {
    let (unsigned, bundles) = authorized_transfer();
    let err = verify(&unsigned, &[]).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::WrongInput);

    let mut stray = bundles.clone();
    stray[0].input_index = 0;
    let err = verify(&unsigned, &stray).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::WrongInput);

    let doubled = vec![bundles[0].clone(), bundles[0].clone()];
    let err = verify(&unsigned, &doubled).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::WrongInput);
}

#[test]
fn test_transaction_edited_after_signing() {
    let (mut unsigned, bundles) = authorized_transfer();
    unsigned.tx.output[0].value = bitcoin::Amount::from_sat(1);
    let err = verify(&unsigned, &bundles).unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::UnexpectedTokenOutput);
}

#[test]
fn test_funding_inputs_are_signed() {
    let unsigned = transfer_from_alice();
    let authorizer = Authorizer::new();

    let funded = authorizer.sign_funding_inputs(&unsigned, &alice()).unwrap();
    assert!(!funded.input[0].script_sig.is_empty());
    assert!(funded.input[1].script_sig.is_empty());
    // Unlocking scripts are outside the token preimage
    assert_eq!(funded.output, unsigned.tx.output);

    let err = authorizer
        .sign_funding_inputs(&unsigned, &bob())
        .unwrap_err();
    assert_eq!(clause(err), AuthorizationClause::WrongSigner);
}

#[test]
fn test_bundle_json_shape() {
    let (_, bundles) = authorized_transfer();
    let value = bundles[0].to_json();
    assert_eq!(value["operation"], "transfer");
    assert_eq!(value["input_index"], 1);
    assert!(value["signature"].as_str().unwrap().ends_with("c1"));
    assert_eq!(
        value["spend_proof"]["subject_txid"],
        txid(0x30).to_string()
    );
}
