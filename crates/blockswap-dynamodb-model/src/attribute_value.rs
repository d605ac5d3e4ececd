//! DynamoDB `AttributeValue` and item accessors.
//!
//! The JSON wire format uses single-key objects like `{"S": "hello"}`.
//! Numbers travel as strings and are parsed on access.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A DynamoDB item: attribute name to value.
pub type Item = HashMap<String, AttributeValue>;

/// DynamoDB attribute value. Exactly one variant is present on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// String value.
    S(String),
    /// Number value (string-encoded).
    N(String),
    /// Binary value (base64 in JSON).
    B(Bytes),
    /// String set.
    Ss(Vec<String>),
    /// Number set.
    Ns(Vec<String>),
    /// Binary set.
    Bs(Vec<Bytes>),
    /// Boolean value.
    Bool(bool),
    /// Null marker.
    Null(bool),
    /// List of values.
    L(Vec<AttributeValue>),
    /// Map of values.
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Returns the string if this is an `S` value.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Parses an `N` value into `T`. `None` for other variants or bad numbers.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockswap_dynamodb_model::AttributeValue;
    ///
    /// assert_eq!(AttributeValue::N("42".into()).as_number::<u64>(), Some(42));
    /// assert_eq!(AttributeValue::S("42".into()).as_number::<u64>(), None);
    /// ```
    #[must_use]
    pub fn as_number<T: FromStr>(&self) -> Option<T> {
        match self {
            Self::N(n) => n.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the list if this is an `L` value.
    #[must_use]
    pub fn as_l(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::L(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the map if this is an `M` value.
    #[must_use]
    pub fn as_m(&self) -> Option<&HashMap<String, AttributeValue>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }

    /// The DynamoDB type descriptor (`S`, `N`, `BOOL`, ...).
    #[must_use]
    pub fn type_descriptor(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Bs(_) => "BS",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "{{S: {s}}}"),
            Self::N(n) => write!(f, "{{N: {n}}}"),
            Self::B(b) => write!(f, "{{B: {} bytes}}", b.len()),
            Self::L(v) => write!(f, "{{L: {} items}}", v.len()),
            Self::M(m) => write!(f, "{{M: {} keys}}", m.len()),
            other => write!(f, "{{{}}}", other.type_descriptor()),
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        let tag = self.type_descriptor();
        match self {
            Self::S(s) | Self::N(s) => map.serialize_entry(tag, s)?,
            Self::B(b) => map.serialize_entry(tag, &STANDARD.encode(b))?,
            Self::Ss(v) | Self::Ns(v) => map.serialize_entry(tag, v)?,
            Self::Bs(v) => {
                let encoded: Vec<String> = v.iter().map(|b| STANDARD.encode(b)).collect();
                map.serialize_entry(tag, &encoded)?;
            }
            Self::Bool(b) | Self::Null(b) => map.serialize_entry(tag, b)?,
            Self::L(list) => map.serialize_entry(tag, list)?,
            Self::M(m) => map.serialize_entry(tag, m)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttributeValueVisitor)
    }
}

struct AttributeValueVisitor;

impl<'de> Visitor<'de> for AttributeValueVisitor {
    type Value = AttributeValue;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a DynamoDB AttributeValue object with exactly one type key")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
        let Some(key) = map.next_key::<String>()? else {
            return Err(de::Error::custom("AttributeValue must have exactly one key"));
        };

        let value = match key.as_str() {
            "S" => AttributeValue::S(map.next_value()?),
            "N" => AttributeValue::N(map.next_value()?),
            "B" => {
                let encoded: String = map.next_value()?;
                AttributeValue::B(decode_base64(&encoded).map_err(de::Error::custom)?)
            }
            "SS" => AttributeValue::Ss(map.next_value()?),
            "NS" => AttributeValue::Ns(map.next_value()?),
            "BS" => {
                let encoded: Vec<String> = map.next_value()?;
                let decoded = encoded
                    .iter()
                    .map(String::as_str)
                    .map(decode_base64)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(de::Error::custom)?;
                AttributeValue::Bs(decoded)
            }
            "BOOL" => AttributeValue::Bool(map.next_value()?),
            "NULL" => AttributeValue::Null(map.next_value()?),
            "L" => AttributeValue::L(map.next_value()?),
            "M" => AttributeValue::M(map.next_value()?),
            other => {
                return Err(de::Error::unknown_field(
                    other,
                    &["S", "N", "B", "SS", "NS", "BS", "BOOL", "NULL", "L", "M"],
                ));
            }
        };

        Ok(value)
    }
}

fn decode_base64(encoded: &str) -> Result<Bytes, base64::DecodeError> {
    STANDARD.decode(encoded).map(Bytes::from)
}

/// Read a string attribute from an item.
#[must_use]
pub fn get_string<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    item.get(name).and_then(AttributeValue::as_s)
}

/// Read and parse a number attribute from an item.
///
/// # Examples
///
/// ```
/// use blockswap_dynamodb_model::{AttributeValue, Item};
/// use blockswap_dynamodb_model::attribute_value::get_number;
///
/// let mut item = Item::new();
/// item.insert("offset".into(), AttributeValue::N("96".into()));
/// assert_eq!(get_number::<u64>(&item, "offset"), Some(96));
/// assert_eq!(get_number::<u64>(&item, "length"), None);
/// ```
#[must_use]
pub fn get_number<T: FromStr>(item: &Item, name: &str) -> Option<T> {
    item.get(name).and_then(AttributeValue::as_number)
}
