//! Covenant token ledger
//!
//! NFT and fungible tokens living in UTXO locking scripts: payload codec, genesis
//! binding, transition builder, spend-proof oracle client and the authorizer that
//! turns a transition into signed unlock bundles.

pub mod authorizer;
pub mod cli;
pub mod config;
pub mod errors;
pub mod explorer;
pub mod genesis;
pub mod lineage;
pub mod oracle;
pub mod output;
pub mod payload;
pub mod retry;
pub mod transition;
pub mod utils;
