use clap::Args;
use futures::future::try_join;
use tracing::info;

use super::context::{
    lineage_context, parse_outpoint, parse_pkh, EndpointArgs, KeyArgs, LineageArgs, Session,
};
use crate::errors::AppResult;
use crate::lineage::LineageContext;
use crate::payload::{FungiblePayload, NftPayload, PayloadCodec};
use crate::transition::{SpentToken, TransitionBuilder};

/// Arguments of every command that spends one NFT output
#[derive(Args, Debug, Clone)]
pub struct TokenArgs {
    #[command(flatten)]
    pub lineage: LineageArgs,

    /// NFT output to spend (txid:vout)
    #[arg(long)]
    pub outpoint: String,

    #[command(flatten)]
    pub keys: KeyArgs,

    #[command(flatten)]
    pub endpoints: EndpointArgs,
}

/// Session, builder and the fetched NFT output named by `args`
async fn open(
    args: &TokenArgs,
) -> AppResult<(Session, TransitionBuilder, SpentToken<NftPayload>)> {
    let session = Session::connect(&args.endpoints)?;
    let lineage = args.lineage.context()?;
    let outpoint = parse_outpoint(&args.outpoint)?;
    let prev = session.fetch_token::<NftPayload>(&lineage, outpoint).await?;
    info!(
        "Spending {} output {} (token id {})",
        prev.output.payload.kind(),
        outpoint,
        prev.output.payload.token_id()
    );
    let builder = session.builder(lineage);
    Ok((session, builder, prev))
}

/// Create a new NFT lineage by spending its origin output
#[derive(Args)]
pub struct GenesisCommand {
    /// Covenant code part, hex
    #[arg(long)]
    pub code_part: String,

    /// P2PKH output to spend as the lineage origin (txid:vout)
    #[arg(long)]
    pub origin: String,

    #[command(flatten)]
    pub keys: KeyArgs,

    #[command(flatten)]
    pub endpoints: EndpointArgs,
}

impl GenesisCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Genesis ===");
        let session = Session::connect(&self.endpoints)?;
        let issuer = self.keys.signer()?;
        let origin = parse_outpoint(&self.origin)?;
        let lineage = lineage_context(&self.code_part, &self.origin, 0)?;
        info!("New lineage bound to {}", lineage.genesis);

        let (satoshis, script) = session.fetch_output(origin).await?;
        let plan =
            session
                .builder(lineage)
                .genesis(origin, satoshis, script, issuer.pubkey_hash())?;
        session
            .complete(plan, Some(&issuer), &self.keys.funder()?, &[])
            .await
    }
}

/// Issue the next token id to a receiver
#[derive(Args)]
pub struct IssueCommand {
    #[command(flatten)]
    pub token: TokenArgs,

    /// Receiver address or pubkey hash hex
    #[arg(long)]
    pub receiver: String,

    /// Token id carried by the continuing issue output (defaults to current + 1)
    #[arg(long)]
    pub next_token_id: Option<u64>,
}

impl IssueCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Issue ===");
        let (session, builder, prev) = open(&self.token).await?;
        let issuer = self.token.keys.signer()?;
        let receiver = parse_pkh(&self.receiver, session.network())?;
        let next_token_id = self
            .next_token_id
            .unwrap_or_else(|| prev.output.payload.token_id().saturating_add(1));

        let plan = builder.issue(&prev, next_token_id, receiver)?;
        let proof = session.fetch_proof(builder.lineage(), prev.outpoint.txid).await?;
        session
            .complete(plan, Some(&issuer), &self.token.keys.funder()?, &[proof])
            .await
    }
}

/// Transfer a token to a new owner
#[derive(Args)]
pub struct TransferCommand {
    #[command(flatten)]
    pub token: TokenArgs,

    /// Receiver address or pubkey hash hex
    #[arg(long)]
    pub receiver: String,
}

impl TransferCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Transfer ===");
        let (session, builder, prev) = open(&self.token).await?;
        let owner = self.token.keys.signer()?;
        let receiver = parse_pkh(&self.receiver, session.network())?;

        let plan = builder.transfer(&prev, receiver)?;
        let proof = session.fetch_proof(builder.lineage(), prev.outpoint.txid).await?;
        session
            .complete(plan, Some(&owner), &self.token.keys.funder()?, &[proof])
            .await
    }
}

/// Offer a token in exchange for fungible tokens of another lineage
#[derive(Args)]
pub struct MakeSwapCommand {
    #[command(flatten)]
    pub token: TokenArgs,

    /// Code part of the fungible lineage accepted in exchange, hex
    #[arg(long)]
    pub counterparty_code_part: String,

    /// Origin outpoint of the fungible lineage (txid:vout)
    #[arg(long)]
    pub counterparty_genesis: String,

    /// Fungible amount asked for
    #[arg(long)]
    pub amount: u64,
}

impl MakeSwapCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Make swap ===");
        let (session, builder, prev) = open(&self.token).await?;
        let owner = self.token.keys.signer()?;
        let counterparty = lineage_context(
            &self.counterparty_code_part,
            &self.counterparty_genesis,
            0,
        )?;

        let plan = builder.make_swap(&prev, counterparty.identity_hash(), self.amount)?;
        let proof = session.fetch_proof(builder.lineage(), prev.outpoint.txid).await?;
        session
            .complete(plan, Some(&owner), &self.token.keys.funder()?, &[proof])
            .await
    }
}

/// Withdraw a standing swap offer
#[derive(Args)]
pub struct CancelSwapCommand {
    #[command(flatten)]
    pub token: TokenArgs,
}

impl CancelSwapCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Cancel swap ===");
        let (session, builder, prev) = open(&self.token).await?;
        let owner = self.token.keys.signer()?;

        let plan = builder.cancel_swap(&prev)?;
        let proof = session.fetch_proof(builder.lineage(), prev.outpoint.txid).await?;
        session
            .complete(plan, Some(&owner), &self.token.keys.funder()?, &[proof])
            .await
    }
}

/// Take a standing swap offer, paying with fungible tokens
#[derive(Args)]
pub struct CompleteSwapCommand {
    #[command(flatten)]
    pub token: TokenArgs,

    /// Fungible token output paying for the swap (txid:vout)
    #[arg(long)]
    pub payment_outpoint: String,

    /// Code part of the fungible lineage, hex
    #[arg(long)]
    pub fungible_code_part: String,

    /// Origin outpoint of the fungible lineage (txid:vout)
    #[arg(long)]
    pub fungible_genesis: String,
}

impl CompleteSwapCommand {
    fn fungible_lineage(&self) -> AppResult<LineageContext> {
        lineage_context(&self.fungible_code_part, &self.fungible_genesis, 0)
    }

    pub async fn run(&self) -> AppResult<()> {
        info!("=== Complete swap ===");
        let (session, builder, prev) = open(&self.token).await?;
        let taker = self.token.keys.signer()?;
        let fungible = self.fungible_lineage()?;
        let payment_outpoint = parse_outpoint(&self.payment_outpoint)?;
        let payment = session
            .fetch_token::<FungiblePayload>(&fungible, payment_outpoint)
            .await?;

        let plan = builder.complete_swap(&prev, &fungible, &payment)?;
        let (nft_proof, payment_proof) = try_join(
            session.fetch_proof(builder.lineage(), prev.outpoint.txid),
            session.fetch_proof(&fungible, payment.outpoint.txid),
        )
        .await?;
        let proofs = [nft_proof, payment_proof];
        session
            .complete(plan, Some(&taker), &self.token.keys.funder()?, &proofs)
            .await
    }
}

/// Put a token up for sale
#[derive(Args)]
pub struct SellCommand {
    #[command(flatten)]
    pub token: TokenArgs,

    /// Asking price in satoshis
    #[arg(long)]
    pub ask: u64,
}

impl SellCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Sell ===");
        let (session, builder, prev) = open(&self.token).await?;
        let owner = self.token.keys.signer()?;

        let plan = builder.sell(&prev, self.ask)?;
        let proof = session.fetch_proof(builder.lineage(), prev.outpoint.txid).await?;
        session
            .complete(plan, Some(&owner), &self.token.keys.funder()?, &[proof])
            .await
    }
}

/// Withdraw a standing sell order
#[derive(Args)]
pub struct CancelSellCommand {
    #[command(flatten)]
    pub token: TokenArgs,
}

impl CancelSellCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Cancel sell ===");
        let (session, builder, prev) = open(&self.token).await?;
        let owner = self.token.keys.signer()?;

        let plan = builder.cancel_sell(&prev)?;
        let proof = session.fetch_proof(builder.lineage(), prev.outpoint.txid).await?;
        session
            .complete(plan, Some(&owner), &self.token.keys.funder()?, &[proof])
            .await
    }
}

/// Buy a token from a standing sell order; --wif is the buyer's key
#[derive(Args)]
pub struct BuyCommand {
    #[command(flatten)]
    pub token: TokenArgs,

    /// Satoshis locked in the buyer's token output (defaults to the configured transfer value)
    #[arg(long)]
    pub satoshis: Option<u64>,
}

impl BuyCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Buy ===");
        let (session, builder, prev) = open(&self.token).await?;
        let buyer = self.token.keys.signer()?;
        let satoshis = self
            .satoshis
            .unwrap_or(session.config.transition.transfer_satoshis);

        let plan = builder.buy(&prev, buyer.pubkey_hash(), satoshis)?;
        let proof = session.fetch_proof(builder.lineage(), prev.outpoint.txid).await?;
        session
            .complete(plan, None, &self.token.keys.funder()?, &[proof])
            .await
    }
}

/// Remove a token from circulation
#[derive(Args)]
pub struct BurnCommand {
    #[command(flatten)]
    pub token: TokenArgs,
}

impl BurnCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Burn ===");
        let (session, builder, prev) = open(&self.token).await?;
        let owner = self.token.keys.signer()?;

        let plan = builder.burn(&prev)?;
        session
            .complete(plan, Some(&owner), &self.token.keys.funder()?, &[])
            .await
    }
}
