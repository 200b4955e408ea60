//! Return-data decoding into host values.
use crate::abi::types::{int_in_range, uint_max, AbiType, MACHINE_INTEGER_MAX_BITS};
use crate::abi::ArgValue;
use alloy_primitives::{Address, I256, U256};

/// Decode a single value laid out as the first (and only) ABI parameter of `data`.
///
/// Unconstrained types have no decoding; their raw return data is surfaced as hex.
pub fn decode_single(kind: &AbiType, data: &[u8]) -> Result<ArgValue, String> {
    if let AbiType::Unconstrained(_) = kind {
        return Ok(ArgValue::hex_bytes(data));
    }
    decode_at(kind, data, 0)
}

pub fn decode_address(data: &[u8]) -> Result<Address, String> {
    let word = read_word(data, 0)?;
    address_from_word(&word)
}

/// A single `uint256` return value that is expected to be a small count.
pub fn decode_count(data: &[u8]) -> Result<usize, String> {
    read_usize(data, 0)
}

/// A single `uint256[]` return value of small counts.
pub fn decode_count_list(data: &[u8]) -> Result<Vec<usize>, String> {
    let (len, base) = array_header(data)?;
    (0..len)
        .map(|index| read_usize(data, base.saturating_add(index.saturating_mul(32))))
        .collect()
}

/// A single `address[]` return value.
pub fn decode_address_list(data: &[u8]) -> Result<Vec<Address>, String> {
    let (len, base) = array_header(data)?;
    (0..len)
        .map(|index| {
            let word = read_word(data, base.saturating_add(index.saturating_mul(32)))?;
            address_from_word(&word)
        })
        .collect()
}

fn array_header(data: &[u8]) -> Result<(usize, usize), String> {
    let offset = read_usize(data, 0)?;
    let len = read_usize(data, offset)?;
    let base = offset
        .checked_add(32)
        .ok_or_else(|| "array offset overflow".to_string())?;
    Ok((len, base))
}

fn decode_at(kind: &AbiType, data: &[u8], head_offset: usize) -> Result<ArgValue, String> {
    if !kind.is_dynamic() {
        return decode_word(kind, &read_word(data, head_offset)?);
    }
    let offset = read_usize(data, head_offset)?;
    match kind {
        AbiType::String => {
            let bytes = read_dynamic_bytes(data, offset)?;
            String::from_utf8(bytes.to_vec())
                .map(ArgValue::String)
                .map_err(|error| format!("string is not valid utf-8: {error}"))
        }
        AbiType::Bytes => Ok(ArgValue::hex_bytes(read_dynamic_bytes(data, offset)?)),
        AbiType::Array(element) => {
            let len = read_usize(data, offset)?;
            let base = offset
                .checked_add(32)
                .ok_or_else(|| "array offset overflow".to_string())?;
            let region = data
                .get(base..)
                .ok_or_else(|| format!("array body at {base} is out of bounds"))?;
            (0..len)
                .map(|index| decode_at(element, region, index.saturating_mul(32)))
                .collect::<Result<Vec<_>, _>>()
                .map(ArgValue::Array)
        }
        other => Err(format!("unsupported dynamic type {other}")),
    }
}

pub(crate) fn decode_word(kind: &AbiType, word: &[u8; 32]) -> Result<ArgValue, String> {
    if !kind.is_well_formed() {
        return Err(format!("type {kind} has an unsupported width"));
    }
    match kind {
        AbiType::Address => address_from_word(word).map(ArgValue::from),
        AbiType::Bool => match U256::from_be_bytes(*word) {
            value if value == U256::ZERO => Ok(ArgValue::Bool(false)),
            value if value == U256::from(1u8) => Ok(ArgValue::Bool(true)),
            _ => Err("bool word must be 0 or 1".to_string()),
        },
        AbiType::Uint(bits) => {
            let value = U256::from_be_bytes(*word);
            if value > uint_max(*bits) {
                return Err(format!("value does not fit uint{bits}"));
            }
            if *bits <= MACHINE_INTEGER_MAX_BITS {
                return Ok(ArgValue::Integer(low_limb(value)));
            }
            Ok(ArgValue::Uint(value))
        }
        AbiType::Int(bits) => {
            let value = I256::from_raw(U256::from_be_bytes(*word));
            if !int_in_range(value, *bits) {
                return Err(format!("value does not fit int{bits}"));
            }
            if *bits <= MACHINE_INTEGER_MAX_BITS {
                let magnitude = low_limb(value.unsigned_abs());
                return Ok(ArgValue::Integer(if value.is_negative() {
                    -magnitude
                } else {
                    magnitude
                }));
            }
            Ok(ArgValue::Int(value))
        }
        AbiType::FixedBytes(width) => Ok(ArgValue::hex_bytes(&word[..*width])),
        other => Err(format!("type {other} does not fit in a single word")),
    }
}

/// Lowest 64 bits of a value already range-checked to at most 48 bits.
fn low_limb(value: U256) -> i64 {
    value.as_limbs()[0] as i64
}

fn address_from_word(word: &[u8; 32]) -> Result<Address, String> {
    if word[..12].iter().any(|byte| *byte != 0) {
        return Err("address word has non-zero padding".to_string());
    }
    Ok(Address::from_slice(&word[12..]))
}

pub(crate) fn read_word(data: &[u8], offset: usize) -> Result<[u8; 32], String> {
    let end = offset
        .checked_add(32)
        .ok_or_else(|| "word offset overflow".to_string())?;
    let slice = data
        .get(offset..end)
        .ok_or_else(|| format!("word at {offset} is out of bounds (len {})", data.len()))?;
    let mut word = [0u8; 32];
    word.copy_from_slice(slice);
    Ok(word)
}

pub(crate) fn read_usize(data: &[u8], offset: usize) -> Result<usize, String> {
    let value = U256::from_be_bytes(read_word(data, offset)?);
    if value > U256::from(u32::MAX) {
        return Err(format!("length or offset at {offset} is implausibly large"));
    }
    Ok(value.as_limbs()[0] as usize)
}

pub(crate) fn read_dynamic_bytes(data: &[u8], offset: usize) -> Result<&[u8], String> {
    let len = read_usize(data, offset)?;
    let start = offset
        .checked_add(32)
        .ok_or_else(|| "bytes offset overflow".to_string())?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| "bytes length overflow".to_string())?;
    data.get(start..end)
        .ok_or_else(|| format!("bytes at {start}..{end} are out of bounds"))
}
