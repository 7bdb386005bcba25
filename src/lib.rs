// src/lib.rs
//! Client-side construction, hashing and multi-signer authorization of
//! account-abstraction user operations.

pub mod builder;
pub mod chain;
pub mod codec;
pub mod error;
pub mod keys;
pub mod multisig;
pub mod resolver;
pub mod rpc;
pub mod service;
pub mod types;

pub use builder::{OperationBuilder, SignedUserOperation};
pub use chain::{ChainClient, RpcChain};
pub use error::UserOpError;
pub use keys::{KeyProvider, LocalKeys};
pub use multisig::SignerSet;
pub use resolver::AddressResolver;
pub use types::{Field, PartialUserOperation, UserOperation};
