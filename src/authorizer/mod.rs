//! Transition authorization
//!
//! - **sighash** - FORKID signature-hash preimage
//! - **verify** - local covenant check of a transition and its unlock bundles
//!
//! [`Authorizer::authorize`] turns an [`UnsignedTransition`] into one [`UnlockBundle`]
//! per token input: sighash preimage, owner signature where the covenant asks for
//! one, the spend-proof for the consumed output and the covenant arguments. The
//! bundles are handed to the external script-unlocking assembler.

use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey};
use bitcoin::{OutPoint, PrivateKey, PubkeyHash, PublicKey, Transaction};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult, AuthorizationClause, TokenError, TokenResult};
use crate::oracle::SpendProof;
use crate::transition::{AnyTokenOutput, Operation, ProducedOutput, UnsignedTransition};

pub mod sighash;
pub mod verify;

pub use sighash::{FUNDING_SIGHASH_TYPE, TOKEN_SIGHASH_TYPE};
pub use verify::verify;

/// Explicit signing key, passed to each call that signs
#[derive(Clone)]
pub struct SigningContext {
    secp: Secp256k1<All>,
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl SigningContext {
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::new(secret_key.public_key(&secp));
        Self {
            secp,
            secret_key,
            public_key,
        }
    }

    pub fn from_wif(wif: &str) -> AppResult<Self> {
        let key = PrivateKey::from_wif(wif.trim())
            .map_err(|e| AppError::InvalidData(format!("invalid WIF key: {}", e)))?;
        Ok(Self::from_secret_key(key.inner))
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn pubkey_hash(&self) -> PubkeyHash {
        self.public_key.pubkey_hash()
    }

    /// DER signature over `digest` followed by the sighash type byte
    pub fn sign(&self, digest: [u8; 32], sighash_type: u32) -> Vec<u8> {
        let message = Message::from_digest(digest);
        let signature = self.secp.sign_ecdsa(&message, &self.secret_key);
        let mut bytes = signature.serialize_der().to_vec();
        bytes.push(sighash_type as u8);
        bytes
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Payload-derived arguments the covenant's unlocking script needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovenantArgs {
    /// Owner of the first produced token output, `None` for a burn
    pub receiver_pkh: Option<PubkeyHash>,
    pub output_satoshis: u64,
    pub change_pkh: PubkeyHash,
    pub change_amount: u64,
}

/// Everything needed to unlock one token input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockBundle {
    pub input_index: usize,
    pub operation: Operation,
    pub preimage: Vec<u8>,
    /// DER signature plus sighash byte, when an owner signature is required
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<PublicKey>,
    pub proof: Option<SpendProof>,
    pub args: CovenantArgs,
}

impl UnlockBundle {
    pub fn to_json(&self) -> Value {
        json!({
            "input_index": self.input_index,
            "operation": self.operation.name(),
            "preimage": hex::encode(&self.preimage),
            "signature": self.signature.as_ref().map(hex::encode),
            "public_key": self.public_key.map(|k| k.to_string()),
            "spend_proof": self.proof.as_ref().map(SpendProof::to_json),
            "receiver_pkh": self.args.receiver_pkh.map(|pkh| pkh.to_string()),
            "output_satoshis": self.args.output_satoshis,
            "change_pkh": self.args.change_pkh.to_string(),
            "change_amount": self.args.change_amount,
        })
    }
}

/// Who must sign a token input and whether it needs a spend-proof
pub(crate) struct InputRequirement {
    pub signer: Option<PubkeyHash>,
    pub needs_proof: bool,
}

pub(crate) fn input_requirement(operation: Operation, token: &AnyTokenOutput) -> InputRequirement {
    let signer = match (operation, token) {
        // A standing sell order may be taken by anyone
        (Operation::Buy, _) => None,
        (Operation::CompleteSwap, AnyTokenOutput::Nft(_)) => None,
        _ => token.owner_pkh(),
    };
    InputRequirement {
        signer,
        needs_proof: operation.requires_spend_proof(),
    }
}

/// The proof answering for the transaction that created `outpoint`
pub(crate) fn select_proof<'a>(
    proofs: impl IntoIterator<Item = &'a SpendProof>,
    outpoint: OutPoint,
) -> TokenResult<&'a SpendProof> {
    let mut offered = 0;
    for proof in proofs {
        // The key alone is caller-supplied; the attested message must agree with it
        if proof.key.subject_txid == outpoint.txid && proof.check_message(None).is_ok() {
            return Ok(proof);
        }
        offered += 1;
    }
    if offered == 0 {
        Err(TokenError::unauthorized(
            AuthorizationClause::MissingProof,
            format!("no spend-proof for input {}", outpoint),
        ))
    } else {
        Err(TokenError::unauthorized(
            AuthorizationClause::ProofMismatch,
            format!(
                "none of {} spend-proofs names {} as spender",
                offered, outpoint.txid
            ),
        ))
    }
}

fn covenant_args(unsigned: &UnsignedTransition) -> CovenantArgs {
    let first_token = unsigned
        .plan
        .produced
        .iter()
        .filter_map(ProducedOutput::as_token)
        // Issue's first output is the issuer's continuation; the receiver is next
        .nth(usize::from(unsigned.plan.operation == Operation::Issue));
    CovenantArgs {
        receiver_pkh: first_token.and_then(AnyTokenOutput::owner_pkh),
        output_satoshis: first_token.map(AnyTokenOutput::satoshis).unwrap_or_default(),
        change_pkh: unsigned.change_pkh,
        change_amount: unsigned.change_amount,
    }
}

#[derive(Debug, Clone)]
pub struct Authorizer {
    sighash_type: u32,
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorizer {
    pub fn new() -> Self {
        Self {
            sighash_type: TOKEN_SIGHASH_TYPE,
        }
    }

    /// One unlock bundle per token input of `unsigned`
    ///
    /// `proofs` are matched to inputs by the spender they name; a proof for some
    /// other transaction fails with `ProofMismatch`.
    pub fn authorize(
        &self,
        unsigned: &UnsignedTransition,
        signer: Option<&SigningContext>,
        proofs: &[SpendProof],
    ) -> TokenResult<Vec<UnlockBundle>> {
        let operation = unsigned.plan.operation;
        let args = covenant_args(unsigned);
        let mut bundles = Vec::new();

        for (index, consumed) in unsigned.consumed_inputs() {
            let token = match &consumed.token {
                Some(token) => token,
                None => continue,
            };
            let requirement = input_requirement(operation, token);

            let preimage = sighash::preimage(
                &unsigned.tx,
                index,
                &consumed.script_pubkey,
                consumed.satoshis,
                self.sighash_type,
            )?;

            let (signature, public_key) = match requirement.signer {
                Some(owner) => {
                    let ctx = signer.ok_or_else(|| {
                        TokenError::unauthorized(
                            AuthorizationClause::WrongSigner,
                            format!("input {} needs a signature from {}", index, owner),
                        )
                    })?;
                    if ctx.pubkey_hash() != owner {
                        return Err(TokenError::unauthorized(
                            AuthorizationClause::WrongSigner,
                            format!(
                                "key {} is not the {} owner {}",
                                ctx.pubkey_hash(),
                                token.kind(),
                                owner
                            ),
                        ));
                    }
                    let digest = sighash::digest(&preimage);
                    (
                        Some(ctx.sign(digest, self.sighash_type)),
                        Some(ctx.public_key()),
                    )
                }
                None => (None, None),
            };

            let proof = if requirement.needs_proof {
                Some(select_proof(proofs, consumed.outpoint)?.clone())
            } else {
                None
            };

            debug!(
                "Authorized input {} ({} {}) signed={} proof={}",
                index,
                operation,
                token.kind(),
                signature.is_some(),
                proof.is_some()
            );
            bundles.push(UnlockBundle {
                input_index: index,
                operation,
                preimage,
                signature,
                public_key,
                proof,
                args: args.clone(),
            });
        }

        info!(
            "Authorized {} transition with {} unlock bundles",
            operation,
            bundles.len()
        );
        Ok(bundles)
    }

    /// Sign every plain P2PKH input of `unsigned` owned by `signer`
    ///
    /// Returns the transaction with funding (and genesis origin) unlocking scripts
    /// set. Token inputs keep empty unlocking scripts for the external assembler.
    pub fn sign_funding_inputs(
        &self,
        unsigned: &UnsignedTransition,
        signer: &SigningContext,
    ) -> TokenResult<Transaction> {
        let mut tx = unsigned.tx.clone();
        let owner_script = bitcoin::ScriptBuf::new_p2pkh(&signer.pubkey_hash());

        for index in 0..tx.input.len() {
            let (value, script) = match unsigned.spent_output(index) {
                Some(spent) => spent,
                None => continue,
            };
            if !script.is_p2pkh() {
                continue;
            }
            if *script != owner_script {
                return Err(TokenError::unauthorized(
                    AuthorizationClause::WrongSigner,
                    format!("funding input {} is not owned by {}", index, signer.pubkey_hash()),
                ));
            }

            let preimage =
                sighash::preimage(&unsigned.tx, index, script, value, FUNDING_SIGHASH_TYPE)?;
            let signature = signer.sign(sighash::digest(&preimage), FUNDING_SIGHASH_TYPE);
            let signature = PushBytesBuf::try_from(signature)
                .map_err(|e| TokenError::malformed(format!("signature push: {}", e)))?;
            tx.input[index].script_sig = Builder::new()
                .push_slice(signature)
                .push_key(&signer.public_key())
                .into_script();
        }
        Ok(tx)
    }
}
