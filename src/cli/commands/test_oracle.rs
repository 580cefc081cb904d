use clap::Args;
use tracing::{error, info};

use super::context::{parse_txid, print_json, EndpointArgs, LineageArgs, Session};
use crate::errors::AppResult;

/// Request a spend-proof for an existing transaction to test oracle connectivity
#[derive(Args)]
pub struct TestOracleCommand {
    /// Transaction that spent an output of the lineage
    pub txid: String,

    #[command(flatten)]
    pub lineage: LineageArgs,

    #[command(flatten)]
    pub endpoints: EndpointArgs,
}

impl TestOracleCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Testing Spend-Proof Oracle ===");
        let txid = parse_txid(&self.txid)?;
        let lineage = self.lineage.context()?;
        let session = Session::connect(&self.endpoints)?;
        info!("Testing oracle at: {}", session.oracle.base_url());

        match session.fetch_proof(&lineage, txid).await {
            Ok(proof) => {
                println!("Spend-proof oracle test PASSED");
                print_json(&proof.to_json())
            }
            Err(e) => {
                error!(
                    "Oracle test failed after {} failed attempts: {}",
                    session.oracle.get_error_count(),
                    e
                );
                println!("Spend-proof oracle test FAILED");
                println!("\nTroubleshooting tips:");
                println!("1. Check the oracle URL (--oracle-url or TOKEN_ORACLE__URL)");
                println!("2. Verify the explorer can serve the transaction and its parents");
                println!("   and that the transaction spends an output of the given lineage");
                println!("3. Ensure oracle.rabin_pubkey matches the oracle's key");
                Err(e)
            }
        }
    }
}
