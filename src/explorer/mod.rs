//! Block explorer integration
//!
//! - **Client** - async explorer client (raw transactions, unspent outputs, broadcast)
//! - **Cache** - raw transaction cache shared between client and worker
//!
//! The client follows an async worker pattern with channel-based request/response
//! handling, a semaphore bounding concurrent HTTP calls, and the shared retry policy.

pub mod cache;
pub mod client;

pub use cache::{CacheStats, RawTransactionCache};
pub use client::{classify_broadcast_error, ExplorerClient, ExplorerRequest, Unspent};
