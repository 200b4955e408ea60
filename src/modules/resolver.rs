use crate::abi::decode::decode_address;
use crate::abi::function::selector;
use crate::domain::errors::ModulesError;
use crate::domain::types::ModuleDescriptor;
use crate::features::transport::{CallOutcome, ContractCall, ModuleTransport};
use crate::modules::registry::RegistryIndex;
use crate::modules::ModulesLogPriority;
use alloy_primitives::Address;
use canlog::log;
use std::sync::Arc;

/// Zero-argument accessor every module instance exposes to declare its implementation.
pub const IDENTITY_SIGNATURE: &str = "IMPLEMENTATION()";

pub fn identity_call(address: Address) -> ContractCall {
    ContractCall::new(address, selector(IDENTITY_SIGNATURE).to_vec())
}

/// Identity carried by a batch entry; failed or malformed entries carry none.
pub fn identity_from_outcome(outcome: &CallOutcome) -> Option<Address> {
    outcome.data().and_then(|data| decode_address(data).ok())
}

/// Read one instance's identity marker. Any failure means "not a module".
pub async fn read_identity<T: ModuleTransport + ?Sized>(
    transport: &T,
    address: Address,
) -> Option<Address> {
    match transport.read_contract(&identity_call(address)).await {
        Ok(data) => decode_address(&data).ok(),
        Err(error) => {
            log!(
                ModulesLogPriority::Info,
                "identity_read_absent address={} reason={}",
                address,
                error
            );
            None
        }
    }
}

/// Read identity markers for all `addresses` in one batch, in input order.
pub async fn read_identities<T: ModuleTransport + ?Sized>(
    transport: &T,
    addresses: &[Address],
) -> Result<Vec<Option<Address>>, ModulesError> {
    if addresses.is_empty() {
        return Ok(Vec::new());
    }
    let calls = addresses
        .iter()
        .map(|address| identity_call(*address))
        .collect::<Vec<_>>();
    let outcomes = checked_multicall(transport, &calls).await?;
    Ok(outcomes.iter().map(identity_from_outcome).collect())
}

pub async fn resolve_one<T: ModuleTransport + ?Sized>(
    transport: &T,
    index: &RegistryIndex,
    address: Address,
) -> Option<Arc<ModuleDescriptor>> {
    let identity = read_identity(transport, address).await?;
    index.by_identity(&identity)
}

/// Resolve every address with one batched read. Output is positionally aligned
/// with `addresses`; unresolvable entries are `None`.
pub async fn resolve_many<T: ModuleTransport + ?Sized>(
    transport: &T,
    index: &RegistryIndex,
    addresses: &[Address],
) -> Result<Vec<Option<Arc<ModuleDescriptor>>>, ModulesError> {
    let identities = read_identities(transport, addresses).await?;
    let resolved = identities
        .iter()
        .map(|identity| identity.as_ref().and_then(|id| index.by_identity(id)))
        .collect::<Vec<_>>();
    log!(
        ModulesLogPriority::Info,
        "resolve_many addresses={} resolved={}",
        addresses.len(),
        resolved.iter().filter(|module| module.is_some()).count()
    );
    Ok(resolved)
}

/// Issue a batch and insist on one outcome per call.
pub(crate) async fn checked_multicall<T: ModuleTransport + ?Sized>(
    transport: &T,
    calls: &[ContractCall],
) -> Result<Vec<CallOutcome>, ModulesError> {
    let outcomes = transport
        .multicall(calls)
        .await
        .map_err(|error| ModulesError::BatchReadFailed {
            reason: error.to_string(),
        })?;
    if outcomes.len() != calls.len() {
        return Err(ModulesError::BatchReadFailed {
            reason: format!(
                "batch returned {} results for {} calls",
                outcomes.len(),
                calls.len()
            ),
        });
    }
    Ok(outcomes)
}
