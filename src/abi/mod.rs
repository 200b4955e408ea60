//! Host value model, type-tag validation, encodings and calldata.
//!
//! 1. [`types`]: parse abstract type tags into [`AbiType`] and validate [`ArgValue`]s.
//! 2. [`encode`]: structured (head/tail) and packed encodings of validated values.
//! 3. [`decode`]: decode return data and log words back into [`ArgValue`]s.
//! 4. [`function`]: read function entries out of a module's raw JSON ABI and build
//!    selector-prefixed calldata.
pub mod decode;
pub mod encode;
pub mod function;
pub mod types;

pub use function::AbiFunction;
pub use types::{host_type, validate, AbiType, HostType};

use alloy_primitives::{Address, I256, U256};
use serde::{Serialize, Serializer};

/// A caller-supplied or decoded parameter value in its host representation.
///
/// Integer tags of at most 48 bits map to [`ArgValue::Integer`]; wider integer tags
/// map to [`ArgValue::Uint`] / [`ArgValue::Int`]. Addresses and byte strings are
/// `0x`-prefixed hex [`ArgValue::String`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    Integer(i64),
    Uint(U256),
    Int(I256),
    String(String),
    Bool(bool),
    Array(Vec<ArgValue>),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::Array(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ArgValue::Integer(_) => "integer",
            ArgValue::Uint(_) | ArgValue::Int(_) => "bigint",
            ArgValue::String(_) => "string",
            ArgValue::Bool(_) => "boolean",
            ArgValue::Array(_) => "array",
        }
    }

    /// Hex form of a byte payload, e.g. an encoding result.
    pub fn hex_bytes(bytes: &[u8]) -> Self {
        ArgValue::String(format!("0x{}", hex::encode(bytes)))
    }
}

impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ArgValue::Integer(value) => serializer.serialize_i64(*value),
            ArgValue::Uint(value) => serializer.serialize_str(&value.to_string()),
            ArgValue::Int(value) => serializer.serialize_str(&value.to_string()),
            ArgValue::String(value) => serializer.serialize_str(value),
            ArgValue::Bool(value) => serializer.serialize_bool(*value),
            ArgValue::Array(values) => serializer.collect_seq(values),
        }
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Integer(value)
    }
}

impl From<U256> for ArgValue {
    fn from(value: U256) -> Self {
        ArgValue::Uint(value)
    }
}

impl From<I256> for ArgValue {
    fn from(value: I256) -> Self {
        ArgValue::Int(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::String(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::String(value)
    }
}

impl From<Address> for ArgValue {
    fn from(value: Address) -> Self {
        ArgValue::hex_bytes(value.as_slice())
    }
}

impl<T: Into<ArgValue>> From<Vec<T>> for ArgValue {
    fn from(values: Vec<T>) -> Self {
        ArgValue::Array(values.into_iter().map(Into::into).collect())
    }
}
