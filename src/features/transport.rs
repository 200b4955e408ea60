use crate::domain::errors::TransportError;
use crate::domain::types::TransactionReceipt;
use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;

/// A read-only contract call at the calldata level.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContractCall {
    pub address: Address,
    pub calldata: Bytes,
}

impl ContractCall {
    pub fn new(address: Address, calldata: impl Into<Bytes>) -> Self {
        Self {
            address,
            calldata: calldata.into(),
        }
    }
}

/// Per-entry result of a batched read. A failed entry never aborts its siblings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    Success(Bytes),
    Failure(String),
}

impl CallOutcome {
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            CallOutcome::Success(data) => Some(data.as_ref()),
            CallOutcome::Failure(_) => None,
        }
    }
}

/// A state-changing call submitted from `from`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractWrite {
    pub from: Address,
    pub to: Address,
    pub calldata: Bytes,
}

/// Network collaborator that carries contract reads, batched reads, and
/// transactions. Implementations own timeouts and cancellation.
#[async_trait(?Send)]
pub trait ModuleTransport {
    async fn read_contract(&self, call: &ContractCall) -> Result<Bytes, TransportError>;

    /// One round trip for all `calls`, results in call order. `Err` only when the
    /// batch itself could not be issued.
    async fn multicall(&self, calls: &[ContractCall]) -> Result<Vec<CallOutcome>, TransportError>;

    async fn write_contract(&self, write: &ContractWrite) -> Result<B256, TransportError>;

    async fn wait_for_transaction_receipt(
        &self,
        transaction_hash: B256,
    ) -> Result<TransactionReceipt, TransportError>;
}
