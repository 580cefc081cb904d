//! Spend-proof oracle integration
//!
//! - **request** - offline-validated `(proof outpoint, subject tx)` pair
//! - **proof** - oracle response parsing and structural validation
//! - **rabin** - Rabin signature check over the attested message
//! - **client** - async HTTP client with retry and per-attempt timeout
//!
//! A spend-proof attests that one output was consumed by one specific transaction.
//! Each transition needs a fresh proof for its own pair; proofs are never cached.

pub mod client;
pub mod proof;
pub mod rabin;
pub mod request;

pub use client::SpendProofClient;
pub use proof::{OracleResponse, OracleSignature, SpendProof};
pub use request::{SpendProofKey, SpendProofRequest};
