//! Structured and packed encodings of validated values.
//!
//! [`encode_parameters`] follows the Solidity ABI head/tail layout: every parameter
//! owns one 32-byte head word; dynamic parameters (`string`, `bytes`, `T[]`) store an
//! offset there and append their payload to the tail. [`encode_packed`] follows
//! `abi.encodePacked`: scalars take their natural width, elements of static-type
//! arrays are padded to full words, and `string[]` / `bytes[]` elements are
//! concatenated unpadded.
//!
//! Types with out-of-range widths (see [`AbiType::is_well_formed`]) are rejected
//! rather than encoded.
use crate::abi::types::{hex_digits, AbiType};
use crate::abi::ArgValue;
use alloy_primitives::{I256, U256};
use std::fmt;

/// Encoding failure tied to the parameter that caused it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeFailure {
    /// Position in the parameter list; `None` when the lists differ in length.
    pub index: Option<usize>,
    pub reason: String,
}

impl fmt::Display for EncodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

fn at(index: usize) -> impl Fn(String) -> EncodeFailure {
    move |reason| EncodeFailure {
        index: Some(index),
        reason,
    }
}

fn check_arity(kinds: &[AbiType], values: &[ArgValue]) -> Result<(), EncodeFailure> {
    if kinds.len() == values.len() {
        return Ok(());
    }
    Err(EncodeFailure {
        index: None,
        reason: format!(
            "abi encode arity mismatch: expected {} values, got {}",
            kinds.len(),
            values.len()
        ),
    })
}

fn check_width(kind: &AbiType, field: &str) -> Result<(), String> {
    if kind.is_well_formed() {
        Ok(())
    } else {
        Err(format!("{field} type {kind} has an unsupported width"))
    }
}

pub fn encode_parameters(kinds: &[AbiType], values: &[ArgValue]) -> Result<Vec<u8>, String> {
    encode_parameters_indexed(kinds, values).map_err(|failure| failure.reason)
}

/// [`encode_parameters`], reporting which parameter failed.
pub fn encode_parameters_indexed(
    kinds: &[AbiType],
    values: &[ArgValue],
) -> Result<Vec<u8>, EncodeFailure> {
    check_arity(kinds, values)?;

    let head_size_bytes = kinds.len().saturating_mul(32);
    let mut heads: Vec<Vec<u8>> = Vec::with_capacity(kinds.len());
    let mut tails: Vec<Vec<u8>> = Vec::new();
    let mut tail_size_bytes = 0usize;

    for (index, (kind, value)) in kinds.iter().zip(values.iter()).enumerate() {
        let field = format!("arg[{index}]");
        check_width(kind, &field).map_err(at(index))?;
        if kind.is_dynamic() {
            let tail = encode_dynamic(kind, value, &field).map_err(at(index))?;
            let offset = head_size_bytes.saturating_add(tail_size_bytes);
            heads.push(encode_u256_word(U256::from(offset)));
            tail_size_bytes = tail_size_bytes.saturating_add(tail.len());
            tails.push(tail);
        } else {
            heads.push(encode_word(kind, value, &field).map_err(at(index))?);
        }
    }

    let mut out = Vec::with_capacity(head_size_bytes.saturating_add(tail_size_bytes));
    for head in heads {
        out.extend_from_slice(&head);
    }
    for tail in tails {
        out.extend_from_slice(&tail);
    }
    Ok(out)
}

fn encode_dynamic(kind: &AbiType, value: &ArgValue, field: &str) -> Result<Vec<u8>, String> {
    match kind {
        AbiType::Array(element) => {
            let values = value
                .as_array()
                .ok_or_else(|| format!("{field} must be an array"))?;
            let element_kinds = vec![element.as_ref().clone(); values.len()];
            let mut out = encode_u256_word(U256::from(values.len()));
            out.extend_from_slice(&encode_parameters(&element_kinds, values)?);
            Ok(out)
        }
        AbiType::Bytes => Ok(encode_dynamic_bytes(&hex_payload(value, field)?)),
        AbiType::String => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("{field} must be a string"))?;
            Ok(encode_dynamic_bytes(text.as_bytes()))
        }
        other => Err(format!("{field} type {other} is not dynamic")),
    }
}

/// Length word followed by the payload zero-padded to the next 32-byte boundary.
pub(crate) fn encode_dynamic_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = encode_u256_word(U256::from(bytes.len()));
    out.extend_from_slice(bytes);
    let padding = (32usize.saturating_sub(bytes.len() % 32)) % 32;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

fn encode_word(kind: &AbiType, value: &ArgValue, field: &str) -> Result<Vec<u8>, String> {
    match kind {
        AbiType::Address => {
            let bytes = address_payload(value, field)?;
            let mut word = vec![0u8; 32];
            word[12..].copy_from_slice(&bytes);
            Ok(word)
        }
        AbiType::Bool => match value {
            ArgValue::Bool(raw) => Ok(encode_u256_word(U256::from(u8::from(*raw)))),
            _ => Err(format!("{field} bool must be true/false")),
        },
        AbiType::Uint(_) | AbiType::Int(_) => Ok(encode_u256_word(integer_word(value, field)?)),
        AbiType::FixedBytes(width) => {
            let bytes = fixed_bytes_payload(value, *width, field)?;
            let mut word = vec![0u8; 32];
            word[..bytes.len()].copy_from_slice(&bytes);
            Ok(word)
        }
        AbiType::Unconstrained(tag) => Err(format!("{field} type {tag} has no encoding")),
        other => Err(format!("{field} type {other} is dynamic")),
    }
}

/// `abi.encodePacked` over a declared parameter list. An empty list encodes to
/// an empty byte string.
pub fn encode_packed(kinds: &[AbiType], values: &[ArgValue]) -> Result<Vec<u8>, String> {
    encode_packed_indexed(kinds, values).map_err(|failure| failure.reason)
}

/// [`encode_packed`], reporting which parameter failed.
pub fn encode_packed_indexed(
    kinds: &[AbiType],
    values: &[ArgValue],
) -> Result<Vec<u8>, EncodeFailure> {
    check_arity(kinds, values)?;
    let mut out = Vec::new();
    for (index, (kind, value)) in kinds.iter().zip(values.iter()).enumerate() {
        let field = format!("arg[{index}]");
        check_width(kind, &field).map_err(at(index))?;
        out.extend_from_slice(&encode_packed_value(kind, value, &field).map_err(at(index))?);
    }
    Ok(out)
}

fn encode_packed_value(kind: &AbiType, value: &ArgValue, field: &str) -> Result<Vec<u8>, String> {
    match kind {
        AbiType::Uint(bits) | AbiType::Int(bits) => {
            let word = encode_u256_word(integer_word(value, field)?);
            Ok(word[32 - bits / 8..].to_vec())
        }
        AbiType::Address => address_payload(value, field),
        AbiType::Bool => match value {
            ArgValue::Bool(raw) => Ok(vec![u8::from(*raw)]),
            _ => Err(format!("{field} bool must be true/false")),
        },
        AbiType::FixedBytes(width) => fixed_bytes_payload(value, *width, field),
        AbiType::Bytes => hex_payload(value, field),
        AbiType::String => value
            .as_str()
            .map(|text| text.as_bytes().to_vec())
            .ok_or_else(|| format!("{field} must be a string")),
        AbiType::Array(element) => {
            if matches!(element.as_ref(), AbiType::Array(_)) {
                return Err(format!("{field} nested arrays cannot be packed"));
            }
            let values = value
                .as_array()
                .ok_or_else(|| format!("{field} must be an array"))?;
            let mut out = Vec::with_capacity(values.len().saturating_mul(32));
            for (index, item) in values.iter().enumerate() {
                let item_field = format!("{field}[{index}]");
                let encoded = if element.is_dynamic() {
                    encode_packed_value(element, item, &item_field)?
                } else {
                    encode_word(element, item, &item_field)?
                };
                out.extend_from_slice(&encoded);
            }
            Ok(out)
        }
        AbiType::Unconstrained(tag) => Err(format!("{field} type {tag} has no encoding")),
    }
}

/// Two's-complement 256-bit representation of an integer value.
fn integer_word(value: &ArgValue, field: &str) -> Result<U256, String> {
    match value {
        ArgValue::Integer(raw) => {
            let magnitude = U256::from(raw.unsigned_abs());
            if *raw < 0 {
                Ok((!magnitude).wrapping_add(U256::from(1u8)))
            } else {
                Ok(magnitude)
            }
        }
        ArgValue::Uint(raw) => Ok(*raw),
        ArgValue::Int(raw) => Ok(I256::into_raw(*raw)),
        other => Err(format!(
            "{field} must be an integer, got {}",
            other.kind_name()
        )),
    }
}

fn hex_payload(value: &ArgValue, field: &str) -> Result<Vec<u8>, String> {
    let raw = value
        .as_str()
        .ok_or_else(|| format!("{field} must be a 0x-prefixed hex string"))?;
    let digits = hex_digits(raw).ok_or_else(|| format!("{field} must be 0x-prefixed hex"))?;
    hex::decode(digits).map_err(|error| format!("failed to decode {field}: {error}"))
}

fn address_payload(value: &ArgValue, field: &str) -> Result<Vec<u8>, String> {
    let bytes = hex_payload(value, field)?;
    if bytes.len() != 20 {
        return Err(format!("{field} address must be 20 bytes"));
    }
    Ok(bytes)
}

fn fixed_bytes_payload(value: &ArgValue, width: usize, field: &str) -> Result<Vec<u8>, String> {
    let bytes = hex_payload(value, field)?;
    if bytes.len() != width {
        return Err(format!(
            "{field} must be exactly {width} bytes, got {}",
            bytes.len()
        ));
    }
    Ok(bytes)
}

/// Encode a `U256` as a big-endian 32-byte ABI word.
pub(crate) fn encode_u256_word(value: U256) -> Vec<u8> {
    value.to_be_bytes::<32>().to_vec()
}
