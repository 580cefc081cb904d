//! Common Test Utilities
//!
//! Shared fixtures (keys, lineages, spent outputs, funding) and a scripted mock HTTP
//! server standing in for the oracle and the block explorer.

#![allow(dead_code)]

pub mod mock_http;
