use std::fmt;

use bitcoin::{OutPoint, Transaction, Txid};

use crate::errors::{TokenError, TokenResult};

/// The `(proof outpoint, subject txid)` pair a spend-proof answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpendProofKey {
    /// Output whose spending is attested
    pub proof_outpoint: OutPoint,
    /// Transaction that spent it
    pub subject_txid: Txid,
}

impl fmt::Display for SpendProofKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} spent by {}", self.proof_outpoint, self.subject_txid)
    }
}

/// Inputs of one spend-proof call, checked offline before any network use
///
/// For a transition spending a token output of transaction `N`, the proof
/// outpoint is the output of `N-1` that `N` consumed and the subject is `N`
/// itself.
#[derive(Debug, Clone)]
pub struct SpendProofRequest {
    pub key: SpendProofKey,
    pub proof_tx_hex: String,
    pub subject_tx_hex: String,
    proof_tx: Transaction,
    subject_tx: Transaction,
}

impl SpendProofRequest {
    pub fn new(
        proof_outpoint: OutPoint,
        proof_tx_hex: &str,
        subject_txid: Txid,
        subject_tx_hex: &str,
    ) -> TokenResult<Self> {
        let proof_tx = decode_tx("proof_tx", proof_tx_hex)?;
        let subject_tx = decode_tx("subject_tx", subject_tx_hex)?;

        let proof_txid = proof_tx.compute_txid();
        if proof_txid != proof_outpoint.txid {
            return Err(TokenError::mismatch(
                "proof_tx",
                proof_outpoint.txid,
                proof_txid,
            ));
        }
        if proof_tx.output.get(proof_outpoint.vout as usize).is_none() {
            return Err(TokenError::mismatch(
                "proof_outpoint",
                format!("output {} of {}", proof_outpoint.vout, proof_txid),
                format!("{} outputs", proof_tx.output.len()),
            ));
        }

        let actual_subject = subject_tx.compute_txid();
        if actual_subject != subject_txid {
            return Err(TokenError::mismatch(
                "subject_tx",
                subject_txid,
                actual_subject,
            ));
        }
        if !subject_tx
            .input
            .iter()
            .any(|input| input.previous_output == proof_outpoint)
        {
            return Err(TokenError::mismatch(
                "subject_tx",
                format!("a transaction spending {}", proof_outpoint),
                format!("{} which does not spend it", subject_txid),
            ));
        }

        Ok(Self {
            key: SpendProofKey {
                proof_outpoint,
                subject_txid,
            },
            proof_tx_hex: proof_tx_hex.to_string(),
            subject_tx_hex: subject_tx_hex.to_string(),
            proof_tx,
            subject_tx,
        })
    }

    /// Value in satoshis of the attested output
    pub fn proof_output_value(&self) -> u64 {
        self.proof_tx
            .output
            .get(self.key.proof_outpoint.vout as usize)
            .map(|output| output.value.to_sat())
            .unwrap_or_default()
    }

    pub fn subject_tx(&self) -> &Transaction {
        &self.subject_tx
    }

    /// Oracle endpoint path for this request
    pub fn path(&self) -> String {
        format!(
            "utxo-spend-by/{}/{}/{}",
            self.key.proof_outpoint.txid, self.key.proof_outpoint.vout, self.key.subject_txid
        )
    }
}

pub(crate) fn decode_tx(field: &'static str, tx_hex: &str) -> TokenResult<Transaction> {
    let bytes = hex::decode(tx_hex.trim())
        .map_err(|e| TokenError::mismatch(field, "raw transaction hex", e))?;
    bitcoin::consensus::deserialize(&bytes)
        .map_err(|e| TokenError::mismatch(field, "raw transaction", e))
}
