//! Abstract type tags and the value checks behind them.
//!
//! A tag such as `uint256`, `int24`, `address`, `bytes32` or `address[]` parses into an
//! [`AbiType`]. Each supported tag has a host representation ([`HostType`]) and a range
//! or shape check ([`validate`]). Tags outside the supported set parse into
//! [`AbiType::Unconstrained`]: they pass validation but cannot be encoded, so an
//! unconstrained creation argument is still rejected before it reaches the chain.
use crate::abi::ArgValue;
use alloy_primitives::{I256, U256};
use std::fmt;

/// Integer widths up to this bound use the machine-integer host representation.
pub const MACHINE_INTEGER_MAX_BITS: usize = 48;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AbiType {
    Uint(usize),
    Int(usize),
    Address,
    Bool,
    String,
    Bytes,
    FixedBytes(usize),
    Array(Box<AbiType>),
    Unconstrained(String),
}

/// Host representation expected for values of a tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostType {
    Integer,
    BigInt,
    String,
    Boolean,
    Array(Box<HostType>),
}

impl AbiType {
    /// Parse a type tag. Never fails: unsupported tags become `Unconstrained`.
    pub fn parse(tag: &str) -> Self {
        let compact = tag
            .chars()
            .filter(|char| !char.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        if let Some(element) = compact.strip_suffix("[]") {
            return match parse_scalar(element) {
                Some(inner) => AbiType::Array(Box::new(inner)),
                None => AbiType::Unconstrained(compact),
            };
        }
        parse_scalar(&compact).unwrap_or(AbiType::Unconstrained(compact))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, AbiType::String | AbiType::Bytes | AbiType::Array(_))
    }

    /// Widths are in the encodable range: integers 8..=256 bits in steps of 8,
    /// fixed byte strings 1..=32 bytes. Parsed tags always are; hand-built ones
    /// may not be.
    pub fn is_well_formed(&self) -> bool {
        match self {
            AbiType::Uint(bits) | AbiType::Int(bits) => is_integer_width(*bits),
            AbiType::FixedBytes(width) => is_fixed_bytes_width(*width),
            AbiType::Array(inner) => inner.is_well_formed(),
            _ => true,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        match self {
            AbiType::Unconstrained(_) => true,
            AbiType::Array(inner) => inner.is_unconstrained(),
            _ => false,
        }
    }

    pub fn host_type(&self) -> Option<HostType> {
        match self {
            AbiType::Uint(bits) | AbiType::Int(bits) if *bits <= MACHINE_INTEGER_MAX_BITS => {
                Some(HostType::Integer)
            }
            AbiType::Uint(_) | AbiType::Int(_) => Some(HostType::BigInt),
            AbiType::Address
            | AbiType::String
            | AbiType::Bytes
            | AbiType::FixedBytes(_) => Some(HostType::String),
            AbiType::Bool => Some(HostType::Boolean),
            AbiType::Array(inner) => inner
                .host_type()
                .map(|element| HostType::Array(Box::new(element))),
            AbiType::Unconstrained(_) => None,
        }
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::Uint(bits) => write!(f, "uint{bits}"),
            AbiType::Int(bits) => write!(f, "int{bits}"),
            AbiType::Address => f.write_str("address"),
            AbiType::Bool => f.write_str("bool"),
            AbiType::String => f.write_str("string"),
            AbiType::Bytes => f.write_str("bytes"),
            AbiType::FixedBytes(width) => write!(f, "bytes{width}"),
            AbiType::Array(inner) => write!(f, "{inner}[]"),
            AbiType::Unconstrained(tag) => f.write_str(tag),
        }
    }
}

fn parse_scalar(kind: &str) -> Option<AbiType> {
    match kind {
        "address" => Some(AbiType::Address),
        "bool" => Some(AbiType::Bool),
        "string" => Some(AbiType::String),
        "bytes" => Some(AbiType::Bytes),
        "uint" => Some(AbiType::Uint(256)),
        "int" => Some(AbiType::Int(256)),
        _ => {
            if let Some(bits) = kind.strip_prefix("uint") {
                return parse_integer_width(bits).map(AbiType::Uint);
            }
            if let Some(bits) = kind.strip_prefix("int") {
                return parse_integer_width(bits).map(AbiType::Int);
            }
            if let Some(width) = kind.strip_prefix("bytes") {
                return parse_decimal(width)
                    .filter(|width| is_fixed_bytes_width(*width))
                    .map(AbiType::FixedBytes);
            }
            None
        }
    }
}

fn parse_integer_width(raw: &str) -> Option<usize> {
    parse_decimal(raw).filter(|bits| is_integer_width(*bits))
}

fn is_integer_width(bits: usize) -> bool {
    (8..=256).contains(&bits) && bits % 8 == 0
}

fn is_fixed_bytes_width(width: usize) -> bool {
    (1..=32).contains(&width)
}

fn parse_decimal(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.as_bytes().iter().all(u8::is_ascii_digit) {
        return None;
    }
    raw.parse::<usize>().ok()
}

/// Host type for a tag; `None` for unconstrained tags.
pub fn host_type(tag: &str) -> Option<HostType> {
    AbiType::parse(tag).host_type()
}

/// Check a value against a parsed tag. Never errors; callers map `false` to
/// `InvalidParameter`. Nothing validates against a malformed width.
pub fn validate(value: &ArgValue, kind: &AbiType) -> bool {
    if !kind.is_well_formed() {
        return false;
    }
    match kind {
        AbiType::Uint(bits) if *bits <= MACHINE_INTEGER_MAX_BITS => match value {
            ArgValue::Integer(raw) => *raw >= 0 && *raw <= machine_max(*bits, false),
            _ => false,
        },
        AbiType::Int(bits) if *bits <= MACHINE_INTEGER_MAX_BITS => match value {
            ArgValue::Integer(raw) => {
                *raw >= machine_min(*bits) && *raw <= machine_max(*bits, true)
            }
            _ => false,
        },
        AbiType::Uint(bits) => match value {
            ArgValue::Uint(raw) => *raw <= uint_max(*bits),
            ArgValue::Int(raw) => !raw.is_negative() && raw.into_raw() <= uint_max(*bits),
            _ => false,
        },
        AbiType::Int(bits) => match value {
            ArgValue::Uint(raw) => *raw <= int_max(*bits),
            ArgValue::Int(raw) => int_in_range(*raw, *bits),
            _ => false,
        },
        AbiType::Address => value.as_str().is_some_and(is_address),
        AbiType::Bool => matches!(value, ArgValue::Bool(_)),
        AbiType::String => matches!(value, ArgValue::String(_)),
        AbiType::Bytes => value
            .as_str()
            .and_then(hex_digits)
            .is_some_and(|digits| digits.len() % 2 == 0),
        AbiType::FixedBytes(width) => value
            .as_str()
            .and_then(hex_digits)
            .is_some_and(|digits| digits.len() == width.saturating_mul(2)),
        AbiType::Array(inner) => value
            .as_array()
            .is_some_and(|items| items.iter().all(|item| validate(item, inner))),
        AbiType::Unconstrained(_) => true,
    }
}

fn machine_max(bits: usize, signed: bool) -> i64 {
    let magnitude_bits = if signed { bits - 1 } else { bits };
    (1i64 << magnitude_bits) - 1
}

fn machine_min(bits: usize) -> i64 {
    -(1i64 << (bits - 1))
}

pub(crate) fn uint_max(bits: usize) -> U256 {
    if bits >= 256 {
        U256::MAX
    } else {
        (U256::from(1u8) << bits) - U256::from(1u8)
    }
}

fn int_max(bits: usize) -> U256 {
    (U256::from(1u8) << (bits - 1)) - U256::from(1u8)
}

pub(crate) fn int_in_range(value: I256, bits: usize) -> bool {
    if value.is_negative() {
        value.unsigned_abs() <= U256::from(1u8) << (bits - 1)
    } else {
        value.into_raw() <= int_max(bits)
    }
}

fn is_address(raw: &str) -> bool {
    hex_digits(raw).is_some_and(|digits| digits.len() == 40)
}

/// Hex digits after a mandatory `0x` prefix, or `None` if the string is not hex.
pub(crate) fn hex_digits(raw: &str) -> Option<&str> {
    let digits = raw.strip_prefix("0x")?;
    digits
        .as_bytes()
        .iter()
        .all(u8::is_ascii_hexdigit)
        .then_some(digits)
}
