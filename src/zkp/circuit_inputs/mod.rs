// src/zkp/circuit_inputs/mod.rs
//! Circuit inputs: named scalars and fixed-width arrays of field elements.

pub mod bigint;
pub mod builders;
pub mod dg1;
pub mod sha_padding;

use std::collections::BTreeMap;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use bigint::{barrett_constant, chunk, reconstruct, LimbLayout};
pub use builders::{select_variant, BuildContext, CircuitVariant};
pub use dg1::extract_dg1;
pub use sha_padding::{sha_pad, PaddedMessage};

/// Presentation of numbers in the rendered inputs. The value is the same
/// either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericFormat {
    #[default]
    Decimal,
    Hex,
}

impl NumericFormat {
    pub fn render(self, value: &BigUint) -> String {
        match self {
            NumericFormat::Decimal => value.to_str_radix(10),
            NumericFormat::Hex => format!("0x{}", value.to_str_radix(16)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitValue {
    Scalar(BigUint),
    Array(Vec<BigUint>),
}

/// Inputs for one proof. Built by a variant builder, then handed to the
/// prover by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitInputs {
    values: BTreeMap<String, CircuitValue>,
}

impl CircuitInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(mut self, name: &str, value: impl Into<BigUint>) -> Self {
        self.values
            .insert(name.to_string(), CircuitValue::Scalar(value.into()));
        self
    }

    pub fn array(mut self, name: &str, values: Vec<BigUint>) -> Self {
        self.values.insert(name.to_string(), CircuitValue::Array(values));
        self
    }

    /// One element per byte.
    pub fn bytes(self, name: &str, bytes: &[u8]) -> Self {
        self.array(name, bytes.iter().map(|b| BigUint::from(*b)).collect())
    }

    pub fn get(&self, name: &str) -> Option<&CircuitValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// JSON object of strings and string arrays, as witness generators read it.
    pub fn to_json(&self, format: NumericFormat) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.values {
            let rendered = match value {
                CircuitValue::Scalar(v) => Value::String(format.render(v)),
                CircuitValue::Array(vs) => {
                    Value::Array(vs.iter().map(|v| Value::String(format.render(v))).collect())
                }
            };
            map.insert(name.clone(), rendered);
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats_render_the_same_value() {
        let inputs = CircuitInputs::new()
            .scalar("skIdentity", 255u32)
            .array("pubkey", vec![BigUint::from(16u8), BigUint::default()]);

        let dec = inputs.to_json(NumericFormat::Decimal);
        let hex = inputs.to_json(NumericFormat::Hex);
        assert_eq!(dec["skIdentity"], "255");
        assert_eq!(hex["skIdentity"], "0xff");
        assert_eq!(dec["pubkey"][0], "16");
        assert_eq!(hex["pubkey"][0], "0x10");
        assert_eq!(hex["pubkey"][1], "0x0");

        let from_hex = BigUint::parse_bytes(b"ff", 16).unwrap();
        let from_dec = BigUint::parse_bytes(b"255", 10).unwrap();
        assert_eq!(from_hex, from_dec);
    }

    #[test]
    fn test_bytes_become_one_element_each() {
        let inputs = CircuitInputs::new().bytes("dg1", &[0, 1, 255]);
        assert_eq!(
            inputs.get("dg1"),
            Some(&CircuitValue::Array(vec![
                BigUint::from(0u8),
                BigUint::from(1u8),
                BigUint::from(255u8)
            ]))
        );
    }

    #[test]
    fn test_numeric_format_serde() {
        let f: NumericFormat = serde_json::from_str("\"hex\"").unwrap();
        assert_eq!(f, NumericFormat::Hex);
        assert_eq!(NumericFormat::default(), NumericFormat::Decimal);
    }
}
