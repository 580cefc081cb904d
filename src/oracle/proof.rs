use bitcoin::hashes::Hash;
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::{json, Value};

use super::rabin;
use super::request::{SpendProofKey, SpendProofRequest};
use crate::errors::{TokenError, TokenResult};

/// Length of the outpoint and value prefix of an attested message
const OUTPOINT_PREFIX_LEN: usize = 44;

/// Oracle attestation that `key.proof_outpoint` was spent by `key.subject_txid`
///
/// Valid only for the exact key it was issued for; never cached or reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendProof {
    pub key: SpendProofKey,
    pub signature: BigUint,
    pub message: Vec<u8>,
    pub padding: Vec<u8>,
}

/// Signature fields as the oracle returns them
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleSignature {
    pub sig_be: String,
    pub payload: String,
    pub padding: String,
}

/// Oracle response body, either wrapped in a status envelope or bare
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OracleResponse {
    Wrapped {
        #[serde(default)]
        code: i64,
        #[serde(default)]
        msg: Option<String>,
        data: OracleSignature,
    },
    Bare(OracleSignature),
}

impl OracleResponse {
    pub fn into_signature(self) -> TokenResult<OracleSignature> {
        match self {
            OracleResponse::Wrapped { code, msg, data } => {
                if code != 0 {
                    return Err(TokenError::rejected(format!(
                        "oracle returned code {}: {}",
                        code,
                        msg.unwrap_or_default()
                    )));
                }
                Ok(data)
            }
            OracleResponse::Bare(data) => Ok(data),
        }
    }
}

impl SpendProof {
    /// Parse the oracle's hex fields into a proof for `key`
    pub fn from_signature(key: SpendProofKey, raw: &OracleSignature) -> TokenResult<Self> {
        let signature = BigUint::parse_bytes(raw.sig_be.as_bytes(), 16)
            .ok_or_else(|| TokenError::rejected(format!("sigBE is not hex: {}", raw.sig_be)))?;
        let message = hex::decode(&raw.payload)
            .map_err(|e| TokenError::rejected(format!("payload is not hex: {}", e)))?;
        let padding = hex::decode(&raw.padding)
            .map_err(|e| TokenError::rejected(format!("padding is not hex: {}", e)))?;
        Ok(Self {
            key,
            signature,
            message,
            padding,
        })
    }

    /// Structural checks against the request that produced this proof
    ///
    /// The attested message starts with the proof outpoint and its value and names
    /// the spending transaction after that prefix.
    pub fn validate(
        &self,
        request: &SpendProofRequest,
        rabin_pubkey: Option<&BigUint>,
    ) -> TokenResult<()> {
        if self.key != request.key {
            return Err(TokenError::rejected(format!(
                "proof answers {} but {} was requested",
                self.key, request.key
            )));
        }
        if self.signature == BigUint::default() {
            return Err(TokenError::rejected("zero signature"));
        }

        self.check_message(Some(request.proof_output_value()))?;

        if let Some(modulus) = rabin_pubkey {
            if !rabin::verify(&self.signature, &self.message, &self.padding, modulus) {
                return Err(TokenError::rejected("Rabin signature does not verify"));
            }
        }
        Ok(())
    }

    /// Check that the attested message describes this proof's own key
    ///
    /// The message opens with `txid (internal order) ‖ LE32 index ‖ LE64 value` of
    /// the proof outpoint and names the spending transaction somewhere after that
    /// prefix. The value is compared only when the caller knows it.
    pub fn check_message(&self, proof_output_value: Option<u64>) -> TokenResult<()> {
        let outpoint = self.key.proof_outpoint;
        let describes_outpoint = self.message.len() >= OUTPOINT_PREFIX_LEN
            && self.message[..32] == outpoint.txid.to_byte_array()
            && self.message[32..36] == outpoint.vout.to_le_bytes();
        let describes_value = describes_outpoint
            && proof_output_value.map_or(true, |value| self.message[36..44] == value.to_le_bytes());
        if !describes_value {
            return Err(TokenError::rejected(format!(
                "attested message does not describe {}",
                outpoint
            )));
        }

        let subject = self.key.subject_txid.to_byte_array();
        if !self.message[OUTPOINT_PREFIX_LEN..]
            .windows(subject.len())
            .any(|window| window == subject)
        {
            return Err(TokenError::rejected(format!(
                "attested message does not name spender {}",
                self.key.subject_txid
            )));
        }
        Ok(())
    }

    /// Unlock-side triple: big-endian signature, message and padding as hex
    pub fn to_json(&self) -> Value {
        json!({
            "proof_outpoint": self.key.proof_outpoint.to_string(),
            "subject_txid": self.key.subject_txid.to_string(),
            "sig_be": self.signature.to_str_radix(16),
            "payload": hex::encode(&self.message),
            "padding": hex::encode(&self.padding),
        })
    }
}
