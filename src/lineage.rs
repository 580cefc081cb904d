//! Per-lineage context
//!
//! A [`LineageContext`] is the explicit value that every builder call receives: the
//! covenant code part and the genesis binding fixed at genesis. It holds no mutable
//! state, so independent lineages can be driven concurrently.

use bitcoin::script::Instruction;
use bitcoin::{OutPoint, Script, ScriptBuf, Transaction};
use tracing::debug;

use crate::errors::{TokenError, TokenResult};
use crate::genesis::{code_with_genesis_hash, GenesisBinding};
use crate::output::TokenOutput;
use crate::payload::PayloadCodec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageContext {
    pub code_part: ScriptBuf,
    pub genesis: GenesisBinding,
}

impl LineageContext {
    pub fn new(code_part: ScriptBuf, genesis: GenesisBinding) -> Self {
        Self { code_part, genesis }
    }

    /// Build an output of this lineage carrying `payload`
    pub fn output<P: PayloadCodec>(&self, payload: P, satoshis: u64) -> TokenOutput<P> {
        TokenOutput {
            code_part: self.code_part.clone(),
            genesis: self.genesis,
            payload,
            satoshis,
        }
    }

    /// Parse a locking script produced by this lineage
    pub fn parse_output<P: PayloadCodec>(
        &self,
        script: &Script,
        satoshis: u64,
    ) -> TokenResult<TokenOutput<P>> {
        let (genesis_bytes, payload_bytes) = split_data_pushes(&self.code_part, script)?;
        let genesis = GenesisBinding::decode(&genesis_bytes)?;
        self.genesis.ensure_same(&genesis)?;
        let payload = P::decode(&payload_bytes)?;
        debug!(
            "Parsed {} output of lineage {} ({} sats)",
            payload.kind(),
            genesis,
            satoshis
        );
        Ok(self.output(payload, satoshis))
    }

    /// True when `script` is this lineage's code part followed by exactly two pushes
    /// whose first push is this lineage's genesis binding
    pub fn is_token_script(&self, script: &Script) -> bool {
        match split_data_pushes(&self.code_part, script) {
            Ok((genesis, _)) => genesis == self.genesis.encode(),
            Err(_) => false,
        }
    }

    /// Input of `spending` through which this lineage passed
    ///
    /// `spent_scripts` are the locking scripts of the outputs `spending` consumes,
    /// in input order. The genesis transaction carries the lineage in through its
    /// origin outpoint; every later transition spends one output of the lineage.
    pub fn carrying_input<S: AsRef<Script>>(
        &self,
        spending: &Transaction,
        spent_scripts: &[S],
    ) -> Option<OutPoint> {
        let origin = self.genesis.origin_outpoint();
        if spending.input.iter().any(|input| input.previous_output == origin) {
            return Some(origin);
        }
        spending
            .input
            .iter()
            .zip(spent_scripts)
            .find(|(_, script)| self.is_token_script(script.as_ref()))
            .map(|(input, _)| input.previous_output)
    }

    /// Check that a token output belongs to this lineage
    pub fn ensure_member<P>(&self, output: &TokenOutput<P>) -> TokenResult<()> {
        if output.code_part != self.code_part {
            return Err(TokenError::mismatch(
                "code_part",
                hex::encode(self.code_part.as_bytes()),
                hex::encode(output.code_part.as_bytes()),
            ));
        }
        self.genesis.ensure_same(&output.genesis)
    }

    /// Identity hash other lineages use to name this one in swap offers
    pub fn identity_hash(&self) -> [u8; 32] {
        code_with_genesis_hash(self.code_part.as_bytes(), &self.genesis)
    }
}

/// Strip `code_part` from `script` and return the two data pushes that follow
pub fn split_data_pushes(code_part: &Script, script: &Script) -> TokenResult<(Vec<u8>, Vec<u8>)> {
    let rest = script
        .as_bytes()
        .strip_prefix(code_part.as_bytes())
        .ok_or_else(|| {
            TokenError::mismatch(
                "code_part",
                hex::encode(code_part.as_bytes()),
                "script with a different code prefix",
            )
        })?;

    let mut pushes = Vec::with_capacity(2);
    for instruction in Script::from_bytes(rest).instructions() {
        match instruction {
            Ok(Instruction::PushBytes(bytes)) => pushes.push(bytes.as_bytes().to_vec()),
            Ok(Instruction::Op(op)) => {
                return Err(TokenError::malformed(format!(
                    "unexpected opcode {} in data part",
                    op
                )))
            }
            Err(e) => {
                return Err(TokenError::malformed(format!(
                    "unparseable data part: {}",
                    e
                )))
            }
        }
    }

    let mut pushes = pushes.into_iter();
    match (pushes.next(), pushes.next(), pushes.next()) {
        (Some(genesis), Some(payload), None) => Ok((genesis, payload)),
        _ => Err(TokenError::malformed(
            "data part must be exactly two pushes (genesis, payload)",
        )),
    }
}
