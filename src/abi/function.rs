//! Function surface of a module's raw JSON ABI.
//!
//! Descriptors carry their ABI opaquely. This module lifts the `function` entries out of
//! it, canonicalises parameter types (`uint` → `uint256`, tuples → `(a,b)`), recomputes
//! 4-byte selectors, and builds or decodes calldata for a chosen function.
use crate::abi::decode::decode_single;
use crate::abi::encode::encode_parameters;
use crate::abi::{AbiType, ArgValue};
use alloy_primitives::{keccak256, Bytes, B256};
use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Debug, Deserialize)]
struct RawAbiEntry {
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    inputs: Vec<RawAbiParam>,
    #[serde(default)]
    outputs: Vec<RawAbiParam>,
    #[serde(rename = "stateMutability", default)]
    state_mutability: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawAbiParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    components: Vec<RawAbiParam>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbiParam {
    pub name: String,
    /// Canonical type string as it appears in the function signature.
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<AbiParam>,
    pub outputs: Vec<AbiParam>,
    pub state_mutability: String,
}

impl AbiFunction {
    /// Build a function from positional type strings.
    pub fn new(name: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        let params = |kinds: &[&str]| {
            kinds
                .iter()
                .map(|kind| AbiParam {
                    name: String::new(),
                    kind: (*kind).to_string(),
                })
                .collect()
        };
        Self {
            name: name.to_string(),
            inputs: params(inputs),
            outputs: params(outputs),
            state_mutability: "view".to_string(),
        }
    }

    pub fn signature(&self) -> String {
        let args = self
            .inputs
            .iter()
            .map(|param| param.kind.as_str())
            .collect::<Vec<_>>();
        format!("{}({})", self.name, args.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        selector(&self.signature())
    }

    /// Zero inputs and exactly one output: usable as a live-parameter accessor.
    pub fn is_parameter_accessor(&self) -> bool {
        self.inputs.is_empty() && self.outputs.len() == 1
    }

    pub fn input_types(&self) -> Vec<AbiType> {
        self.inputs
            .iter()
            .map(|param| AbiType::parse(&param.kind))
            .collect()
    }

    /// Selector followed by the structured encoding of `args`.
    pub fn encode_call(&self, args: &[ArgValue]) -> Result<Bytes, String> {
        let encoded = encode_parameters(&self.input_types(), args)
            .map_err(|error| format!("{}: {error}", self.signature()))?;
        let mut calldata = Vec::with_capacity(4 + encoded.len());
        calldata.extend_from_slice(&self.selector());
        calldata.extend_from_slice(&encoded);
        Ok(Bytes::from(calldata))
    }

    /// Decode the single return value of this function.
    pub fn decode_output(&self, data: &[u8]) -> Result<ArgValue, String> {
        let output = match self.outputs.as_slice() {
            [output] => output,
            _ => {
                return Err(format!(
                    "{} must declare exactly one output to decode",
                    self.signature()
                ))
            }
        };
        decode_single(&AbiType::parse(&output.kind), data)
            .map_err(|error| format!("failed to decode {} output: {error}", self.name))
    }
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.as_slice()[..4]);
    out
}

pub fn selector_hex(signature: &str) -> String {
    format!("0x{}", hex::encode(selector(signature)))
}

pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// All `function` entries of a raw ABI (a bare array or an object with an `abi` array).
pub fn parse_functions(abi: &Value) -> Result<Vec<AbiFunction>, String> {
    let entries_value = if abi.is_array() {
        abi.clone()
    } else if let Some(array) = abi.get("abi") {
        array.clone()
    } else if abi.is_null() {
        return Ok(Vec::new());
    } else {
        return Err("abi must be an array or object containing an `abi` array".to_string());
    };
    let entries: Vec<RawAbiEntry> = serde_json::from_value(entries_value)
        .map_err(|error| format!("invalid abi format: {error}"))?;

    let mut functions = Vec::new();
    for entry in entries {
        if entry.entry_type != "function" {
            continue;
        }
        let name = entry
            .name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| "function entry must include a non-empty name".to_string())?
            .to_string();
        let inputs = entry
            .inputs
            .iter()
            .map(normalize_raw_param)
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = entry
            .outputs
            .iter()
            .map(normalize_raw_param)
            .collect::<Result<Vec<_>, _>>()?;
        functions.push(AbiFunction {
            name,
            inputs,
            outputs,
            state_mutability: entry
                .state_mutability
                .unwrap_or_else(|| "nonpayable".to_string()),
        });
    }
    Ok(functions)
}

/// First function named `name`, optionally restricted to a given input arity so that
/// overloads can be told apart.
pub fn find_function(
    abi: &Value,
    name: &str,
    arity: Option<usize>,
) -> Result<Option<AbiFunction>, String> {
    Ok(parse_functions(abi)?.into_iter().find(|function| {
        function.name == name && arity.map_or(true, |count| function.inputs.len() == count)
    }))
}

fn normalize_raw_param(raw: &RawAbiParam) -> Result<AbiParam, String> {
    Ok(AbiParam {
        name: raw.name.clone(),
        kind: canonicalize_raw_param(raw)?,
    })
}

fn canonicalize_raw_param(raw: &RawAbiParam) -> Result<String, String> {
    let normalized_kind = normalize_raw_kind(&raw.kind)?;
    if let Some(suffix) = normalized_kind.strip_prefix("tuple") {
        if raw.components.is_empty() {
            return Err("tuple parameter must provide components".to_string());
        }
        let components = raw
            .components
            .iter()
            .map(canonicalize_raw_param)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(format!("({}){suffix}", components.join(",")));
    }
    Ok(normalized_kind)
}

fn normalize_raw_kind(raw_kind: &str) -> Result<String, String> {
    let compact = raw_kind
        .chars()
        .filter(|char| !char.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if compact.is_empty() {
        return Err("abi type must be non-empty".to_string());
    }

    if let Some(suffix) = compact.strip_prefix("tuple") {
        validate_array_suffix(suffix)?;
        return Ok(format!("tuple{suffix}"));
    }

    let (base, suffix) = split_base_and_suffix(&compact);
    validate_array_suffix(suffix)?;
    let canonical_base = match base {
        "uint" => "uint256",
        "int" => "int256",
        _ => base,
    };
    if canonical_base.is_empty() {
        return Err("abi type base must be non-empty".to_string());
    }
    Ok(format!("{canonical_base}{suffix}"))
}

fn split_base_and_suffix(kind: &str) -> (&str, &str) {
    if let Some(start) = kind.find('[') {
        (&kind[..start], &kind[start..])
    } else {
        (kind, "")
    }
}

fn validate_array_suffix(raw_suffix: &str) -> Result<(), String> {
    let bytes = raw_suffix.as_bytes();
    let mut index = 0usize;
    while index < bytes.len() {
        if bytes[index] != b'[' {
            return Err(format!("invalid array suffix in abi type: {raw_suffix}"));
        }
        index = index.saturating_add(1);
        while index < bytes.len() && bytes[index].is_ascii_digit() {
            index = index.saturating_add(1);
        }
        if index >= bytes.len() || bytes[index] != b']' {
            return Err(format!("invalid array suffix in abi type: {raw_suffix}"));
        }
        index = index.saturating_add(1);
    }
    Ok(())
}
