//! CLI Smoke Test
//!
//! Runs the offline subcommands of the built binary and checks their JSON output
//! and error reporting. Network subcommands are covered by the client tests.

use std::process::{Command, Output};

use serde_json::Value;

use covenant_token::payload::{NftPayload, PayloadCodec};

use crate::common::fixtures::{alice, nft_lineage, NFT_CODE, NFT_ORIGIN};

fn covenant_token(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_covenant-token"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run covenant-token binary")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_decode_payload() {
    let payload = NftPayload::Transfer {
        owner_pkh: alice().pubkey_hash(),
        token_id: 12,
    };
    let output = covenant_token(&["decode-payload", &hex::encode(payload.encode())]);
    let value = stdout_json(&output);

    assert_eq!(value["kind"], "transfer");
    assert_eq!(value["token_id"], 12);
    assert_eq!(value["owner_pkh"], alice().pubkey_hash().to_string());
}

#[test]
fn test_decode_output() {
    let output = nft_lineage().output(
        NftPayload::Sell {
            owner_pkh: alice().pubkey_hash(),
            token_id: 3,
            ask_satoshis: 25_000,
        },
        5_000,
    );
    let script = hex::encode(output.locking_script().as_bytes());
    let result = covenant_token(&[
        "decode-output",
        "--code-part",
        &hex::encode(NFT_CODE),
        "--script",
        &script,
    ]);
    let value = stdout_json(&result);

    assert_eq!(
        value["genesis"]["origin_outpoint"],
        format!("{}:0", NFT_ORIGIN)
    );
    assert_eq!(value["genesis"]["issue_output_index"], 0);
    assert_eq!(
        value["genesis"]["identity_hash"],
        hex::encode(nft_lineage().identity_hash())
    );
    assert_eq!(value["payload"]["kind"], "sell");
    assert_eq!(value["payload"]["ask_satoshis"], 25_000);
}

#[test]
fn test_errors_are_reported_by_kind() {
    let payload = NftPayload::Transfer {
        owner_pkh: alice().pubkey_hash(),
        token_id: 1,
    }
    .encode();

    let truncated = covenant_token(&["decode-payload", &hex::encode(&payload[..10])]);
    assert!(!truncated.status.success());
    let stderr = String::from_utf8_lossy(&truncated.stderr);
    assert!(
        stderr.starts_with("Error: MalformedPayload:"),
        "stderr: {}",
        stderr
    );

    let not_hex = covenant_token(&["decode-payload", "zz"]);
    assert!(!not_hex.status.success());
    assert!(String::from_utf8_lossy(&not_hex.stderr).starts_with("Error: InvalidData:"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let output = covenant_token(&["mint-everything"]);
    assert!(!output.status.success());
}
