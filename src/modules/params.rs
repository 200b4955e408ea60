use crate::abi::function::{parse_functions, AbiFunction};
use crate::domain::errors::ModulesError;
use crate::domain::types::{ModuleDescriptor, ModuleParameter};
use crate::features::transport::{ContractCall, ModuleTransport};
use crate::modules::ModulesLogPriority;
use alloy_primitives::Address;
use canlog::log;

/// Current values of the module's declared parameters on one instance.
///
/// Descriptors whose accessor is missing from the ABI or is not zero-in/one-out
/// are skipped. Reads run one after another; any read or decode failure fails
/// the whole fetch.
pub async fn live_parameters<T: ModuleTransport + ?Sized>(
    transport: &T,
    module: &ModuleDescriptor,
    address: Address,
) -> Result<Vec<ModuleParameter>, ModulesError> {
    let functions = match parse_functions(&module.abi) {
        Ok(functions) => functions,
        Err(error) => {
            log!(
                ModulesLogPriority::Warn,
                "live_params_abi_unreadable module={} reason={}",
                module.id,
                error
            );
            Vec::new()
        }
    };

    let mut parameters = Vec::with_capacity(module.parameters.len());
    for descriptor in &module.parameters {
        let Some(accessor) = accessor(&functions, &descriptor.function_name) else {
            continue;
        };
        let calldata = accessor
            .encode_call(&[])
            .map_err(|reason| call_failed(address, &accessor, reason))?;
        let data = transport
            .read_contract(&ContractCall::new(address, calldata))
            .await
            .map_err(|error| call_failed(address, &accessor, error.to_string()))?;
        let value = accessor
            .decode_output(&data)
            .map_err(|reason| call_failed(address, &accessor, reason))?;
        parameters.push(ModuleParameter {
            label: descriptor.label.clone(),
            value,
            solidity_type: accessor.outputs[0].kind.clone(),
            display_type: descriptor.display_type.clone(),
        });
    }
    Ok(parameters)
}

fn accessor<'a>(functions: &'a [AbiFunction], name: &str) -> Option<&'a AbiFunction> {
    functions
        .iter()
        .find(|function| function.name == name && function.is_parameter_accessor())
}

fn call_failed(address: Address, accessor: &AbiFunction, reason: String) -> ModulesError {
    ModulesError::ModuleCallFailed {
        address,
        function: accessor.name.clone(),
        reason,
    }
}
