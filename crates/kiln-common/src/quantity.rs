//! Kubernetes resource quantities
//!
//! Parses CPU and memory requests under the cluster's quantity grammar:
//!
//! ```text
//! <quantity>        ::= <signedNumber><suffix>
//! <number>          ::= <digits> | <digits>.<digits> | <digits>. | .<digits>
//! <suffix>          ::= <binarySI> | <decimalExponent> | <decimalSI>
//! <binarySI>        ::= Ki | Mi | Gi | Ti | Pi | Ei
//! <decimalSI>       ::= m | "" | k | M | G | T | P | E
//! <decimalExponent> ::= "e" <signedInt> | "E" <signedInt>
//! ```
//!
//! Requests are never negative, so a leading `-` is rejected even though the
//! grammar allows it.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const DECIMAL_SI: [&str; 7] = ["m", "k", "M", "G", "T", "P", "E"];
const BINARY_SI: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

/// Why a string is not a valid quantity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    /// The string was empty
    #[error("quantity is empty")]
    Empty,
    /// The string starts with a minus sign
    #[error("quantity '{0}' must not be negative")]
    Negative(String),
    /// No digits before the suffix
    #[error("quantity '{0}' has no numeric part")]
    MissingNumber(String),
    /// The suffix is not part of the grammar
    #[error("quantity '{value}' has unknown suffix '{suffix}'")]
    UnknownSuffix {
        /// The full input
        value: String,
        /// The unparseable tail
        suffix: String,
    },
}

/// A validated resource quantity, stored in the exact form the user wrote it
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Quantity {
    raw: String,
}

impl Quantity {
    /// The quantity as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let unsigned = match s.as_bytes()[0] {
            b'-' => return Err(QuantityError::Negative(s.to_string())),
            b'+' => &s[1..],
            _ => s,
        };

        let (number_len, digits) = number_prefix(unsigned);
        if digits == 0 {
            return Err(QuantityError::MissingNumber(s.to_string()));
        }

        let suffix = &unsigned[number_len..];
        if !is_suffix(suffix) {
            return Err(QuantityError::UnknownSuffix {
                value: s.to_string(),
                suffix: suffix.to_string(),
            });
        }

        Ok(Self { raw: s.to_string() })
    }
}

/// Length of the leading `<number>` and how many digits it contains
fn number_prefix(s: &str) -> (usize, usize) {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut digits = 0;

    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            digits += 1;
        }
    }

    (i, digits)
}

/// `<binarySI> | <decimalExponent> | <decimalSI>`
fn is_suffix(suffix: &str) -> bool {
    if suffix.is_empty() || DECIMAL_SI.contains(&suffix) || BINARY_SI.contains(&suffix) {
        return true;
    }

    let Some(exponent) = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))
    else {
        return false;
    };
    let exponent = exponent
        .strip_prefix('+')
        .or_else(|| exponent.strip_prefix('-'))
        .unwrap_or(exponent);
    !exponent.is_empty() && exponent.bytes().all(|b| b.is_ascii_digit())
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for Quantity {
    fn schema_name() -> String {
        "Quantity".to_string()
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::Schema::Object(schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            metadata: Some(Box::new(schemars::schema::Metadata {
                description: Some(
                    "Kubernetes resource quantity, e.g. '500m', '2Gi', '1.5'".to_string(),
                ),
                ..Default::default()
            })),
            ..Default::default()
        })
    }
}
