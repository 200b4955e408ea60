use crate::abi::encode::{encode_packed_indexed, encode_parameters_indexed, EncodeFailure};
use crate::abi::{validate, AbiType, ArgValue};
use crate::domain::errors::{ArgSet, ModulesError};
use crate::domain::types::{ModuleDescriptor, WriteFunction};
use crate::modules::ModulesLogPriority;
use alloy_primitives::Bytes;
use canlog::log;

/// Creation arguments ready for the factory: packed immutable args and the
/// structured mutable-args block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedCreationArgs {
    pub immutable: Bytes,
    pub mutable: Bytes,
}

struct DeclaredArg<'a> {
    name: &'a str,
    kind: AbiType,
}

/// Check arity of both sets, then each value's type in declared order, then encode.
///
/// Pure: no network access, identical inputs give identical bytes.
pub fn check_and_encode(
    module: &ModuleDescriptor,
    immutable_args: &[ArgValue],
    mutable_args: &[ArgValue],
) -> Result<EncodedCreationArgs, ModulesError> {
    let immutable = declared(
        module
            .creation_args
            .immutable
            .iter()
            .map(|arg| (arg.name.as_str(), arg.kind.as_str())),
    );
    let mutable = declared(
        module
            .creation_args
            .mutable
            .iter()
            .map(|arg| (arg.name.as_str(), arg.kind.as_str())),
    );

    check_arity(ArgSet::Immutable, &immutable, immutable_args)?;
    check_arity(ArgSet::Mutable, &mutable, mutable_args)?;
    check_types(&immutable, immutable_args)?;
    check_types(&mutable, mutable_args)?;

    let packed = encode_set(&immutable, immutable_args, encode_packed_indexed)?;
    let structured = encode_set(&mutable, mutable_args, encode_parameters_indexed)?;
    Ok(EncodedCreationArgs {
        immutable: Bytes::from(packed),
        mutable: Bytes::from(structured),
    })
}

/// Arity and type check for a write-function call. Values are encoded later
/// against the module ABI, so nothing is encoded here.
pub fn check_write_args(function: &WriteFunction, args: &[ArgValue]) -> Result<(), ModulesError> {
    let declared = declared(
        function
            .args
            .iter()
            .map(|arg| (arg.name.as_str(), arg.kind.as_str())),
    );
    check_arity(ArgSet::WriteFunction, &declared, args)?;
    check_types(&declared, args)
}

fn declared<'a>(args: impl Iterator<Item = (&'a str, &'a str)>) -> Vec<DeclaredArg<'a>> {
    args.map(|(name, tag)| DeclaredArg {
        name,
        kind: AbiType::parse(tag),
    })
    .collect()
}

fn check_arity(set: ArgSet, declared: &[DeclaredArg<'_>], values: &[ArgValue]) -> Result<(), ModulesError> {
    if declared.len() != values.len() {
        return Err(ModulesError::ParameterCountMismatch {
            set,
            expected: declared.len(),
            actual: values.len(),
        });
    }
    Ok(())
}

fn check_types(declared: &[DeclaredArg<'_>], values: &[ArgValue]) -> Result<(), ModulesError> {
    for (arg, value) in declared.iter().zip(values) {
        if arg.kind.is_unconstrained() {
            log!(
                ModulesLogPriority::Warn,
                "unconstrained_argument name={} type={} value_kind={}",
                arg.name,
                arg.kind,
                value.kind_name()
            );
        }
        if !validate(value, &arg.kind) {
            return Err(ModulesError::InvalidParameter {
                name: arg.name.to_string(),
                reason: format!("{} value does not satisfy type {}", value.kind_name(), arg.kind),
            });
        }
    }
    Ok(())
}

fn encode_set(
    declared: &[DeclaredArg<'_>],
    values: &[ArgValue],
    encode: fn(&[AbiType], &[ArgValue]) -> Result<Vec<u8>, EncodeFailure>,
) -> Result<Vec<u8>, ModulesError> {
    if let Some(arg) = declared.iter().find(|arg| arg.kind.is_unconstrained()) {
        return Err(ModulesError::InvalidParameter {
            name: arg.name.to_string(),
            reason: format!("type {} has no canonical encoding", arg.kind),
        });
    }
    let kinds = declared.iter().map(|arg| arg.kind.clone()).collect::<Vec<_>>();
    encode(&kinds, values).map_err(|failure| ModulesError::InvalidParameter {
        name: failure
            .index
            .and_then(|index| declared.get(index))
            .map(|arg| arg.name.to_string())
            .unwrap_or_default(),
        reason: failure.reason,
    })
}
