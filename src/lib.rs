//! Registry-driven creation and introspection of on-chain rule modules.
//!
//! A [`ModulesClient`] indexes the public module registry for one chain, then
//! creates module instances through the module factory, resolves deployed
//! instances back to their registry entries, and rebuilds rule chains into
//! [`Ruleset`]s (an AND of clauses, each an ordered OR of modules).
//!
//! All network access goes through a [`ModuleTransport`]; [`HttpEvmRpcClient`]
//! is the JSON-RPC implementation.
pub mod abi;
pub mod client;
pub mod config;
pub mod domain;
pub mod features;
pub mod modules;

#[cfg(test)]
mod test_support;

pub use abi::{AbiType, ArgValue};
pub use client::{InstanceSpec, ModulesClient};
pub use config::{ChainIdentities, ClientConfig};
pub use domain::errors::{ArgSet, ModulesError, TransportError};
pub use domain::types::{
    BatchCreateInstancesResult, CallFunctionResult, Catalog, ChainKind, ClauseMember,
    CreateInstanceResult, ModuleDescriptor, ModuleParameter, Ruleset, RulesetOptions,
    TransactionReceipt, TransactionStatus,
};
pub use features::{CallOutcome, ContractCall, ContractWrite, HttpEvmRpcClient, ModuleTransport};
