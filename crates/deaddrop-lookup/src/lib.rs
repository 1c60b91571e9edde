//! Identity resolution tiers and the combinators that compose them.
//!
//! A deployment builds an ordered chain of [`Resolver`]s: the local registry,
//! optionally a chain-backed registry and another relay over HTTP, joined by
//! [`Fallback`] or [`DualRead`].
//!
//! [`Resolver`]: deaddrop_shared::lookup::Resolver

pub mod chain;
pub mod dual_read;
pub mod error;
pub mod fallback;
pub mod remote;

#[cfg(test)]
mod testing;

pub use chain::{ChainClient, ChainResolver, MemoryChain};
pub use dual_read::{Authority, DualRead};
pub use error::ChainError;
pub use fallback::Fallback;
pub use remote::RemoteResolver;
