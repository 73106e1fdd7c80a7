//! Attribute values
//!
//! Attributes are a tree of plain values. Documents themselves are not
//! allowed as values; reference another document by its identifier instead.
//! Maps are ordered so that encoding an attribute set is canonical and its
//! checksum is stable across runs.

use crate::error::AttributeError;
use crate::identifier::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Attributes = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
    Identifier(Identifier),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Render scalars for substitution into text; lists and maps yield `None`
    pub fn to_display_string(&self) -> Option<String> {
        match self {
            AttributeValue::Null => Some(String::new()),
            AttributeValue::Bool(b) => Some(b.to_string()),
            AttributeValue::Integer(n) => Some(n.to_string()),
            AttributeValue::Float(x) => Some(x.to_string()),
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Identifier(id) => Some(id.to_string()),
            AttributeValue::List(_) | AttributeValue::Map(_) => None,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Integer(n)
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        AttributeValue::Integer(n.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(x: f64) -> Self {
        AttributeValue::Float(x)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<Identifier> for AttributeValue {
    fn from(id: Identifier) -> Self {
        AttributeValue::Identifier(id)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Attributes> for AttributeValue {
    fn from(map: Attributes) -> Self {
        AttributeValue::Map(map)
    }
}

/// Conversion used by attribute setters.
///
/// Plain values always convert. Types that must not be stored as attribute
/// values (documents) implement this by returning
/// [`AttributeError::DisallowedAttributeValue`].
pub trait IntoAttribute {
    fn into_attribute(self, key: &str) -> Result<AttributeValue, AttributeError>;
}

macro_rules! into_attribute_via_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoAttribute for $ty {
                fn into_attribute(self, _key: &str) -> Result<AttributeValue, AttributeError> {
                    Ok(self.into())
                }
            }
        )*
    };
}

into_attribute_via_from!(
    AttributeValue,
    bool,
    i64,
    i32,
    f64,
    &str,
    String,
    Identifier,
    Attributes,
    Vec<AttributeValue>,
    Vec<String>,
);
