//! Arguments and plumbing shared by the transition commands

use std::str::FromStr;

use bitcoin::consensus::encode::{serialize, serialize_hex};
use bitcoin::{Address, Network, OutPoint, PubkeyHash, ScriptBuf, Transaction, Txid};
use clap::Args;
use serde_json::{json, Value};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::authorizer::{verify, Authorizer, SigningContext, UnlockBundle};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult, TokenError};
use crate::explorer::ExplorerClient;
use crate::genesis::GenesisBinding;
use crate::lineage::LineageContext;
use crate::oracle::{SpendProof, SpendProofClient, SpendProofRequest};
use crate::payload::PayloadCodec;
use crate::transition::{assemble, FundingInput, SpentToken, TransitionBuilder, TransitionPlan};
use crate::utils::currency::{fee_rate, format_rate_as_btc, format_sats_as_btc};

/// Endpoint and fee overrides shared by every network command
#[derive(Args, Debug, Clone, Default)]
pub struct EndpointArgs {
    /// Spend-proof oracle URL (overrides covenant-token.toml)
    #[arg(long)]
    pub oracle_url: Option<String>,

    /// Block explorer URL prefix (overrides covenant-token.toml)
    #[arg(long)]
    pub explorer_url: Option<String>,

    /// Transaction fee in satoshis (overrides covenant-token.toml)
    #[arg(long)]
    pub fee: Option<u64>,
}

impl EndpointArgs {
    /// Configuration from file/environment with CLI overrides applied
    pub fn config(&self) -> AppConfig {
        let mut config = match AppConfig::load() {
            Ok(config) => {
                info!("Configuration loaded successfully");
                config
            }
            Err(e) => {
                warn!("Failed to load configuration: {}", e);
                info!("Using default configuration");
                AppConfig::default()
            }
        };

        if let Some(url) = &self.oracle_url {
            config.oracle.url = url.clone();
        }
        if let Some(url) = &self.explorer_url {
            config.explorer.url = url.clone();
        }
        if let Some(fee) = self.fee {
            config.transition.fee = fee;
        }
        config
    }
}

/// The NFT lineage a command operates on
#[derive(Args, Debug, Clone)]
pub struct LineageArgs {
    /// Covenant code part of the lineage, hex
    #[arg(long)]
    pub code_part: String,

    /// Origin outpoint the lineage was created from (txid:vout)
    #[arg(long)]
    pub genesis: String,

    /// Index of the issue output inside the genesis transaction
    #[arg(long, default_value_t = 0)]
    pub issue_index: u32,
}

impl LineageArgs {
    pub fn context(&self) -> AppResult<LineageContext> {
        lineage_context(&self.code_part, &self.genesis, self.issue_index)
    }
}

/// Signing and funding keys
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// WIF private key of the token owner (the buyer for `buy`)
    #[arg(long)]
    pub wif: String,

    /// WIF key paying the fee and receiving change (defaults to --wif)
    #[arg(long)]
    pub funding_wif: Option<String>,
}

impl KeyArgs {
    pub fn signer(&self) -> AppResult<SigningContext> {
        SigningContext::from_wif(&self.wif)
    }

    pub fn funder(&self) -> AppResult<SigningContext> {
        SigningContext::from_wif(self.funding_wif.as_deref().unwrap_or(&self.wif))
    }
}

pub fn parse_outpoint(value: &str) -> AppResult<OutPoint> {
    OutPoint::from_str(value.trim())
        .map_err(|e| AppError::InvalidData(format!("invalid outpoint '{}': {}", value, e)))
}

pub fn parse_txid(value: &str) -> AppResult<Txid> {
    Txid::from_str(value.trim())
        .map_err(|e| AppError::InvalidData(format!("invalid txid '{}': {}", value, e)))
}

pub fn parse_script(value: &str) -> AppResult<ScriptBuf> {
    hex::decode(value.trim())
        .map(ScriptBuf::from_bytes)
        .map_err(|e| AppError::InvalidData(format!("script is not hex: {}", e)))
}

/// Address on `network` or bare 20-byte pubkey hash hex
pub fn parse_pkh(value: &str, network: Network) -> AppResult<PubkeyHash> {
    let value = value.trim();
    if value.len() == 40 {
        if let Ok(pkh) = PubkeyHash::from_str(value) {
            return Ok(pkh);
        }
    }
    let address = Address::from_str(value)
        .map_err(|e| AppError::InvalidData(format!("invalid address '{}': {}", value, e)))?
        .require_network(network)
        .map_err(|e| AppError::InvalidData(format!("address '{}': {}", value, e)))?;
    address
        .pubkey_hash()
        .ok_or_else(|| AppError::InvalidData(format!("{} is not a P2PKH address", value)))
}

pub fn lineage_context(code_part: &str, origin: &str, issue_index: u32) -> AppResult<LineageContext> {
    let code_part = parse_script(code_part)?;
    let origin = parse_outpoint(origin)?;
    Ok(LineageContext::new(
        code_part,
        GenesisBinding::bind(origin.txid, origin.vout, issue_index),
    ))
}

pub fn print_json(value: &Value) -> AppResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::InvalidData(format!("Failed to render JSON: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Clients and configuration for one command invocation
pub struct Session {
    pub config: AppConfig,
    pub explorer: ExplorerClient,
    pub oracle: SpendProofClient,
    pub authorizer: Authorizer,
}

impl Session {
    pub fn connect(endpoints: &EndpointArgs) -> AppResult<Self> {
        let config = endpoints.config();
        info!(
            "Explorer: {}, oracle: {}",
            config.explorer.url, config.oracle.url
        );
        let explorer = ExplorerClient::new(config.explorer.clone())?;
        let oracle = SpendProofClient::new(&config.oracle)?;
        Ok(Self {
            config,
            explorer,
            oracle,
            authorizer: Authorizer::new(),
        })
    }

    pub fn network(&self) -> Network {
        self.config.transition.network
    }

    pub fn builder(&self, lineage: LineageContext) -> TransitionBuilder {
        TransitionBuilder::new(lineage, &self.config.transition)
    }

    pub async fn fetch_tx(&self, txid: Txid) -> AppResult<Transaction> {
        Ok(self.explorer.get_transaction(&txid.to_string()).await?)
    }

    /// Value and locking script of `outpoint`
    pub async fn fetch_output(&self, outpoint: OutPoint) -> AppResult<(u64, ScriptBuf)> {
        let tx = self.fetch_tx(outpoint.txid).await?;
        let output = tx.output.get(outpoint.vout as usize).ok_or_else(|| {
            AppError::InvalidData(format!(
                "{} has no output {} ({} outputs)",
                outpoint.txid,
                outpoint.vout,
                tx.output.len()
            ))
        })?;
        Ok((output.value.to_sat(), output.script_pubkey.clone()))
    }

    pub async fn fetch_token<P: PayloadCodec>(
        &self,
        lineage: &LineageContext,
        outpoint: OutPoint,
    ) -> AppResult<SpentToken<P>> {
        let (satoshis, script) = self.fetch_output(outpoint).await?;
        let output = lineage.parse_output::<P>(&script, satoshis)?;
        Ok(SpentToken::new(outpoint, output))
    }

    /// Spend-proof that `created_by` spent the previous output of `lineage`
    ///
    /// The attested outpoint is the input of `created_by` whose spent output belongs
    /// to `lineage`, or the lineage origin when `created_by` is the genesis
    /// transaction. Input position is not used, since a swap completion carries two
    /// lineages after its funding inputs.
    pub async fn fetch_proof(
        &self,
        lineage: &LineageContext,
        created_by: Txid,
    ) -> AppResult<SpendProof> {
        let subject_hex = self
            .explorer
            .get_raw_transaction(&created_by.to_string())
            .await?;
        let subject = self.fetch_tx(created_by).await?;
        let spent_scripts = try_join_all(
            subject
                .input
                .iter()
                .map(|input| self.fetch_output(input.previous_output)),
        )
        .await?
        .into_iter()
        .map(|(_, script)| script)
        .collect::<Vec<_>>();

        let proof_outpoint = lineage
            .carrying_input(&subject, &spent_scripts)
            .ok_or_else(|| {
                TokenError::mismatch(
                    "proof_outpoint",
                    format!("an input of lineage {}", lineage.genesis),
                    format!("{} spends no output of it", created_by),
                )
            })?;
        debug!("Proof for {} attests {}", created_by, proof_outpoint);
        let proof_hex = self
            .explorer
            .get_raw_transaction(&proof_outpoint.txid.to_string())
            .await?;

        let request =
            SpendProofRequest::new(proof_outpoint, &proof_hex, created_by, &subject_hex)?;
        Ok(self.oracle.request_proof(&request).await?)
    }

    /// Select funding from `funder`'s unspent outputs until the plan is covered
    async fn select_funding(
        &self,
        plan: &TransitionPlan,
        funder: &SigningContext,
    ) -> AppResult<Vec<FundingInput>> {
        let address = Address::p2pkh(funder.pubkey_hash(), self.network());
        let needed = plan.fee_hint.funding_needed();
        let unspent = self.explorer.list_unspent(&address.to_string()).await?;

        let mut funding = Vec::new();
        let mut gathered = 0u64;
        for entry in &unspent {
            if gathered >= needed {
                break;
            }
            let input = FundingInput::from_unspent(entry, &address)?;
            if plan.consumed.iter().any(|c| c.outpoint == input.outpoint) {
                continue;
            }
            gathered = gathered.saturating_add(input.satoshis);
            funding.push(input);
        }
        info!(
            "Selected {} funding inputs worth {} from {} (need {})",
            funding.len(),
            format_sats_as_btc(gathered),
            address,
            format_sats_as_btc(needed)
        );
        Ok(funding)
    }

    /// Fund, authorize and locally verify `plan`, then print the result
    pub async fn complete(
        &self,
        plan: TransitionPlan,
        token_signer: Option<&SigningContext>,
        funder: &SigningContext,
        proofs: &[SpendProof],
    ) -> AppResult<()> {
        let funding = self.select_funding(&plan, funder).await?;
        let unsigned = assemble(plan, funding, funder.pubkey_hash())?;
        let bundles = self.authorizer.authorize(&unsigned, token_signer, proofs)?;
        verify(&unsigned, &bundles)?;
        let funded = self.authorizer.sign_funding_inputs(&unsigned, funder)?;

        let size = serialize(&funded).len();
        info!(
            "{} transition {} ready: {} inputs, {} outputs",
            unsigned.plan.operation,
            unsigned.txid(),
            unsigned.tx.input.len(),
            unsigned.tx.output.len()
        );
        print_json(&json!({
            "operation": unsigned.plan.operation.name(),
            "txid": unsigned.txid().to_string(),
            "unsigned_tx_hex": unsigned.raw_hex(),
            "funded_tx_hex": serialize_hex(&funded),
            "summary": unsigned.summary(),
            "fee": format_sats_as_btc(unsigned.fee()),
            "fee_rate": format_rate_as_btc(fee_rate(unsigned.fee(), size)),
            "change": format_sats_as_btc(unsigned.change_amount),
            "bundles": bundles.iter().map(UnlockBundle::to_json).collect::<Vec<_>>(),
        }))
    }
}
