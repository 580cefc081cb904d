//! Token output and locking-script layout
//!
//! A token output's locking script is `code_part ‖ PUSH(genesis) ‖ PUSH(payload)`.
//! The code part is the covenant's verification logic shared by every output of a
//! lineage; the two pushes carry the genesis binding and the state payload.

use bitcoin::opcodes::all::{OP_PUSHDATA1, OP_PUSHDATA2};
use bitcoin::{Amount, ScriptBuf, TxOut};

use crate::genesis::{GenesisBinding, GENESIS_LEN};
use crate::payload::PayloadCodec;

/// A token-carrying output, built fresh for each transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOutput<P> {
    pub code_part: ScriptBuf,
    pub genesis: GenesisBinding,
    pub payload: P,
    pub satoshis: u64,
}

impl<P: PayloadCodec> TokenOutput<P> {
    /// Full locking script of the output
    pub fn locking_script(&self) -> ScriptBuf {
        let payload = self.payload.encode();
        let mut bytes =
            Vec::with_capacity(self.code_part.len() + GENESIS_LEN + payload.len() + 4);
        bytes.extend_from_slice(self.code_part.as_bytes());
        push_data(&mut bytes, &self.genesis.encode());
        push_data(&mut bytes, &payload);
        ScriptBuf::from_bytes(bytes)
    }

    /// Raw `genesis ‖ payload` state bytes, without push opcodes
    pub fn data_part(&self) -> Vec<u8> {
        let mut data = self.genesis.encode().to_vec();
        data.extend(self.payload.encode());
        data
    }

    pub fn to_txout(&self) -> TxOut {
        TxOut {
            value: Amount::from_sat(self.satoshis),
            script_pubkey: self.locking_script(),
        }
    }

    /// Same lineage and code part, new state and value
    pub fn successor<Q: PayloadCodec>(&self, payload: Q, satoshis: u64) -> TokenOutput<Q> {
        TokenOutput {
            code_part: self.code_part.clone(),
            genesis: self.genesis,
            payload,
            satoshis,
        }
    }
}

/// Append a minimal data push of `data` to a raw script
pub(crate) fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1.to_u8() as usize {
        script.push(len as u8);
    } else if len <= u8::MAX as usize {
        script.push(OP_PUSHDATA1.to_u8());
        script.push(len as u8);
    } else {
        script.push(OP_PUSHDATA2.to_u8());
        script.extend_from_slice(&(len as u16).to_le_bytes());
    }
    script.extend_from_slice(data);
}
