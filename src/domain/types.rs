use crate::abi::ArgValue;
use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

// ── Registry catalog ────────────────────────────────────────────────────────

/// Registry document as published by the module registry.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

/// One catalog entry. Immutable once the registry index has been built.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Lower-case implementation address; assigned by the registry index.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub links: Vec<ModuleLink>,
    pub implementation_address: Address,
    #[serde(default)]
    pub deployments: Vec<ModuleDeployment>,
    #[serde(default)]
    pub creation_args: CreationArgs,
    #[serde(default)]
    pub custom_roles: Vec<CustomRole>,
    #[serde(default)]
    pub write_functions: Vec<WriteFunction>,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    #[serde(default, rename = "type")]
    pub module_type: ModuleType,
    #[serde(default)]
    pub tags: Vec<Value>,
    /// Raw JSON ABI, passed through to calldata construction.
    #[serde(default)]
    pub abi: Value,
}

impl ModuleDescriptor {
    pub fn is_deployed_on(&self, chain_id: u64) -> bool {
        let wanted = chain_id.to_string();
        self.deployments
            .iter()
            .any(|deployment| deployment.chain_id.trim() == wanted)
    }

    /// Custom roles paired with the write functions that name them.
    pub fn roles(&self) -> Vec<ModuleRole> {
        self.custom_roles
            .iter()
            .map(|role| ModuleRole {
                id: role.id.clone(),
                name: role.name.clone(),
                criteria: role.criteria.clone(),
                write_functions: self
                    .write_functions
                    .iter()
                    .filter(|function| function.roles.iter().any(|id| id == &role.id))
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    pub fn write_function(&self, function_name: &str) -> Option<&WriteFunction> {
        self.write_functions
            .iter()
            .find(|function| function.function_name == function_name)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleLink {
    pub label: String,
    pub link: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDeployment {
    pub chain_id: String,
    #[serde(default)]
    pub block: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreationArgs {
    #[serde(default)]
    pub use_hat_id: bool,
    #[serde(default)]
    pub immutable: Vec<ModuleArg>,
    #[serde(default)]
    pub mutable: Vec<ModuleArg>,
}

/// A declared creation parameter. `kind` is the abstract type tag.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleArg {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub example: Value,
    #[serde(default)]
    pub display_type: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomRole {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub criteria: String,
    #[serde(default)]
    pub hat_admins_fallback: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriteFunction {
    #[serde(default)]
    pub roles: Vec<String>,
    pub function_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub args: Vec<WriteFunctionArg>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriteFunctionArg {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub display_type: String,
    #[serde(default)]
    pub optional: bool,
}

/// Declares a zero-argument accessor whose value is shown as a live parameter.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    pub label: String,
    pub function_name: String,
    #[serde(default)]
    pub display_type: String,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleType {
    #[serde(default)]
    pub eligibility: bool,
    #[serde(default)]
    pub toggle: bool,
    #[serde(default)]
    pub hatter: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ModuleRole {
    pub id: String,
    pub name: String,
    pub criteria: String,
    pub write_functions: Vec<WriteFunction>,
}

// ── Rulesets ────────────────────────────────────────────────────────────────

/// Rule category of a chain implementation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    Eligibility,
    Toggle,
}

/// Current on-chain value of one declared parameter.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleParameter {
    pub label: String,
    pub value: ArgValue,
    pub solidity_type: String,
    pub display_type: String,
}

/// One OR-alternative inside a clause.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClauseMember {
    pub module: Arc<ModuleDescriptor>,
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_params: Option<Vec<ModuleParameter>>,
}

/// AND of clauses, each an ordered OR of members.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct Ruleset {
    pub clauses: Vec<Vec<ClauseMember>>,
}

impl Ruleset {
    pub fn single(member: ClauseMember) -> Self {
        Self {
            clauses: vec![vec![member]],
        }
    }

    pub fn members(&self) -> impl Iterator<Item = &ClauseMember> {
        self.clauses.iter().flatten()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RulesetOptions {
    pub include_live_params: bool,
}

// ── Transaction results ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Success,
    Reverted,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceResult {
    pub status: TransactionStatus,
    pub transaction_hash: B256,
    /// `None` only when the transaction reverted.
    pub new_instance: Option<Address>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateInstancesResult {
    pub status: TransactionStatus,
    pub transaction_hash: B256,
    pub new_instances: Vec<Address>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionResult {
    pub status: TransactionStatus,
    pub transaction_hash: B256,
}

/// Mined transaction as reported by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub success: bool,
    pub logs: Vec<ReceiptLog>,
}

impl TransactionReceipt {
    pub fn status(&self) -> TransactionStatus {
        if self.success {
            TransactionStatus::Success
        } else {
            TransactionStatus::Reverted
        }
    }

    /// Logs emitted by `emitter` whose first topic is `topic0`, in log order.
    pub fn logs_matching(&self, emitter: Address, topic0: B256) -> impl Iterator<Item = &ReceiptLog> {
        self.logs.iter().filter(move |log| {
            log.address == emitter && log.topics.first() == Some(&topic0)
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}
