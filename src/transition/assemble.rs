use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use serde_json::{json, Value};
use tracing::debug;

use super::{ConsumedOutput, TransitionPlan};
use crate::errors::{TokenError, TokenResult};
use crate::explorer::Unspent;

/// A plain P2PKH output paying for fee and produced value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingInput {
    pub outpoint: OutPoint,
    pub satoshis: u64,
    pub script_pubkey: ScriptBuf,
}

impl FundingInput {
    /// Funding input from an explorer unspent entry owned by `address`
    pub fn from_unspent(unspent: &Unspent, address: &Address) -> TokenResult<Self> {
        let txid: Txid = unspent
            .tx_hash
            .parse()
            .map_err(|_| TokenError::mismatch("funding_txid", "a txid", &unspent.tx_hash))?;
        Ok(Self {
            outpoint: OutPoint::new(txid, unspent.tx_pos),
            satoshis: unspent.value,
            script_pubkey: address.script_pubkey(),
        })
    }
}

/// Transaction skeleton of a plan with funding and change resolved
///
/// Input order: funding inputs, then the plan's consumed outputs.
/// Output order: the plan's produced outputs, then change when non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransition {
    pub plan: TransitionPlan,
    pub tx: Transaction,
    pub funding: Vec<FundingInput>,
    pub change_pkh: PubkeyHash,
    pub change_amount: u64,
}

impl UnsignedTransition {
    pub fn fee(&self) -> u64 {
        self.plan.fee_hint.fee
    }

    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }

    pub fn total_input(&self) -> u64 {
        self.funding.iter().map(|f| f.satoshis).sum::<u64>()
            + self.plan.consumed.iter().map(|c| c.satoshis).sum::<u64>()
    }

    pub fn total_output(&self) -> u64 {
        self.tx.output.iter().map(|o| o.value.to_sat()).sum()
    }

    /// Transaction input index of each consumed output, in plan order
    pub fn consumed_inputs(&self) -> impl Iterator<Item = (usize, &ConsumedOutput)> {
        let offset = self.funding.len();
        self.plan
            .consumed
            .iter()
            .enumerate()
            .map(move |(i, consumed)| (offset + i, consumed))
    }

    /// Value and script of the output spent by input `index`
    pub fn spent_output(&self, index: usize) -> Option<(u64, &ScriptBuf)> {
        if let Some(funding) = self.funding.get(index) {
            return Some((funding.satoshis, &funding.script_pubkey));
        }
        self.plan
            .consumed
            .get(index - self.funding.len())
            .map(|c| (c.satoshis, &c.script_pubkey))
    }

    pub fn raw_hex(&self) -> String {
        bitcoin::consensus::encode::serialize_hex(&self.tx)
    }

    pub fn summary(&self) -> Value {
        json!({
            "operation": self.plan.operation.name(),
            "inputs": self.tx.input.len(),
            "outputs": self.tx.output.len(),
            "total_input": self.total_input(),
            "fee": self.fee(),
            "change": self.change_amount,
        })
    }
}

fn txin(previous_output: OutPoint) -> TxIn {
    TxIn {
        previous_output,
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

/// Resolve funding and change for `plan`
///
/// `change = total_in - fee - Σ produced`; a negative result is `InsufficientFunds`
/// and a zero result adds no change output.
pub fn assemble(
    plan: TransitionPlan,
    funding: Vec<FundingInput>,
    change_pkh: PubkeyHash,
) -> TokenResult<UnsignedTransition> {
    let fee = plan.fee_hint.fee;
    let total_in = funding
        .iter()
        .map(|f| f.satoshis)
        .chain(plan.consumed.iter().map(|c| c.satoshis))
        .try_fold(0u64, u64::checked_add)
        .ok_or_else(|| TokenError::malformed("input value overflows u64"))?;
    let needed = plan
        .produced
        .iter()
        .map(|p| p.satoshis())
        .try_fold(fee, u64::checked_add)
        .ok_or_else(|| TokenError::malformed("output value overflows u64"))?;

    if total_in < needed {
        return Err(TokenError::InsufficientFunds {
            needed,
            available: total_in,
        });
    }
    let change_amount = total_in - needed;

    let input = funding
        .iter()
        .map(|f| txin(f.outpoint))
        .chain(plan.consumed.iter().map(|c| txin(c.outpoint)))
        .collect();
    let mut output: Vec<TxOut> = plan.produced.iter().map(|p| p.to_txout()).collect();
    if change_amount > 0 {
        output.push(TxOut {
            value: Amount::from_sat(change_amount),
            script_pubkey: ScriptBuf::new_p2pkh(&change_pkh),
        });
    }

    let tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input,
        output,
    };
    debug!(
        "Assembled {} transition: in {} sats, fee {} sats, change {} sats",
        plan.operation, total_in, fee, change_amount
    );

    Ok(UnsignedTransition {
        plan,
        tx,
        funding,
        change_pkh,
        change_amount,
    })
}
