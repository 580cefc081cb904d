use clap::Args;
use serde_json::{json, Value};

use super::context::{parse_script, print_json};
use crate::errors::{AppError, AppResult};
use crate::genesis::{code_with_genesis_hash, GenesisBinding};
use crate::lineage::split_data_pushes;
use crate::payload::{FungiblePayload, NftPayload, PayloadCodec};

fn nft_json(payload: &NftPayload) -> Value {
    let mut value = json!({
        "kind": payload.kind(),
        "owner_pkh": payload.owner().to_string(),
        "token_id": payload.token_id(),
    });
    match payload {
        NftPayload::Swap {
            counterparty_genesis_hash,
            counterparty_amount,
            ..
        } => {
            value["counterparty_genesis_hash"] = json!(hex::encode(counterparty_genesis_hash));
            value["counterparty_amount"] = json!(counterparty_amount);
        }
        NftPayload::Sell { ask_satoshis, .. } => {
            value["ask_satoshis"] = json!(ask_satoshis);
        }
        NftPayload::Issue { .. } | NftPayload::Transfer { .. } => {}
    }
    value
}

fn fungible_json(payload: &FungiblePayload) -> Value {
    match payload {
        FungiblePayload::Mint {
            block_header,
            block_height,
        } => json!({
            "kind": payload.kind(),
            "block_header": hex::encode(block_header),
            "block_height": block_height,
        }),
        FungiblePayload::Transfer { owner_pkh, amount } => json!({
            "kind": payload.kind(),
            "owner_pkh": owner_pkh.to_string(),
            "amount": amount,
        }),
        FungiblePayload::Swap {
            owner_pkh,
            amount,
            counterparty_genesis,
            counterparty_amount,
        } => json!({
            "kind": payload.kind(),
            "owner_pkh": owner_pkh.to_string(),
            "amount": amount,
            "counterparty_genesis": counterparty_genesis.to_string(),
            "counterparty_amount": counterparty_amount,
        }),
        FungiblePayload::Sell {
            owner_pkh,
            amount,
            ask_satoshis,
        } => json!({
            "kind": payload.kind(),
            "owner_pkh": owner_pkh.to_string(),
            "amount": amount,
            "ask_satoshis": ask_satoshis,
        }),
    }
}

/// JSON view of an NFT payload, or a fungible one when `fungible` is set
pub fn payload_json(bytes: &[u8], fungible: bool) -> AppResult<Value> {
    let value = if fungible {
        fungible_json(&FungiblePayload::decode(bytes)?)
    } else {
        nft_json(&NftPayload::decode(bytes)?)
    };
    Ok(value)
}

/// Decode a token payload
#[derive(Args)]
pub struct DecodePayloadCommand {
    /// Payload bytes, hex
    pub payload: String,

    /// Decode as a fungible token payload
    #[arg(long)]
    pub fungible: bool,
}

impl DecodePayloadCommand {
    pub async fn run(&self) -> AppResult<()> {
        let bytes = hex::decode(self.payload.trim())
            .map_err(|e| AppError::InvalidData(format!("payload is not hex: {}", e)))?;
        print_json(&payload_json(&bytes, self.fungible)?)
    }
}

/// Decode the genesis binding and payload of a token locking script
#[derive(Args)]
pub struct DecodeOutputCommand {
    /// Covenant code part the script starts with, hex
    #[arg(long)]
    pub code_part: String,

    /// Full locking script, hex
    #[arg(long)]
    pub script: String,

    /// Decode the payload as a fungible token payload
    #[arg(long)]
    pub fungible: bool,
}

impl DecodeOutputCommand {
    pub async fn run(&self) -> AppResult<()> {
        let code_part = parse_script(&self.code_part)?;
        let script = parse_script(&self.script)?;
        let (genesis_bytes, payload_bytes) = split_data_pushes(&code_part, &script)?;
        let genesis = GenesisBinding::decode(&genesis_bytes)?;

        print_json(&json!({
            "genesis": {
                "origin_outpoint": genesis.origin_outpoint().to_string(),
                "issue_output_index": genesis.issue_output_index,
                "identity_hash": hex::encode(code_with_genesis_hash(code_part.as_bytes(), &genesis)),
            },
            "payload": payload_json(&payload_bytes, self.fungible)?,
        }))
    }
}
