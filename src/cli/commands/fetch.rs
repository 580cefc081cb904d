use bitcoin::consensus::encode::serialize_hex;
use clap::Args;
use serde_json::json;
use tracing::info;

use super::context::{parse_txid, print_json, EndpointArgs};
use crate::errors::AppResult;
use crate::explorer::ExplorerClient;

/// Fetch a transaction from the block explorer
#[derive(Args)]
pub struct FetchCommand {
    /// Transaction ID to fetch
    pub txid: String,

    #[command(flatten)]
    pub endpoints: EndpointArgs,
}

impl FetchCommand {
    pub async fn run(&self) -> AppResult<()> {
        let txid = parse_txid(&self.txid)?;
        let config = self.endpoints.config();
        info!("Fetching {} from {}", txid, config.explorer.url);

        let explorer = ExplorerClient::new(config.explorer)?;
        let tx = explorer.get_transaction(&txid.to_string()).await?;

        let inputs: Vec<_> = tx
            .input
            .iter()
            .map(|input| input.previous_output.to_string())
            .collect();
        let outputs: Vec<_> = tx
            .output
            .iter()
            .map(|output| {
                json!({
                    "value": output.value.to_sat(),
                    "script_pubkey": hex::encode(output.script_pubkey.as_bytes()),
                })
            })
            .collect();

        print_json(&json!({
            "txid": tx.compute_txid().to_string(),
            "raw_hex": serialize_hex(&tx),
            "inputs": inputs,
            "outputs": outputs,
        }))
    }
}

/// Broadcast a raw transaction through the block explorer
#[derive(Args)]
pub struct BroadcastCommand {
    /// Raw transaction, hex
    pub raw_hex: String,

    #[command(flatten)]
    pub endpoints: EndpointArgs,
}

impl BroadcastCommand {
    pub async fn run(&self) -> AppResult<()> {
        let config = self.endpoints.config();
        let explorer = ExplorerClient::new(config.explorer)?;
        let txid = explorer.broadcast(&self.raw_hex).await?;
        info!("Broadcast accepted: {}", txid);
        print_json(&json!({ "txid": txid.to_string() }))
    }
}
