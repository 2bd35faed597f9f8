//! Parameters: declarations (`ParamSpec`), assignments (`Param`) and values.
//!
//! Tekton treats an absent `type` as `string` everywhere. That rule lives in
//! [`ParamType::effective`] and every validator goes through it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::refs;

/// Declared type of a parameter or result.
///
/// Unknown values are kept verbatim so the structural pass can name them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParamType {
    String,
    Array,
    Object,
    Other(String),
}

impl ParamType {
    /// Effective type of an optional declaration: absent means `string`.
    pub fn effective(declared: Option<&ParamType>) -> ParamType {
        declared.cloned().unwrap_or(ParamType::String)
    }

    /// Unrecognized types behave like `string` when comparing usages.
    pub fn lenient(self) -> ParamType {
        match self {
            ParamType::Other(_) => ParamType::String,
            known => known,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ParamType::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ParamType::String => "string",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for ParamType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "string" => ParamType::String,
            "array" => ParamType::Array,
            "object" => ParamType::Object,
            _ => ParamType::Other(value),
        }
    }
}

impl From<ParamType> for String {
    fn from(value: ParamType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A literal value: string, array of strings, or flat object.
///
/// Scalars that are not strings (numbers, booleans) are read as strings,
/// the same way the Kubernetes YAML decoder coerces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Array(Vec<String>),
    Object(BTreeMap<String, String>),
}

impl Default for ParamValue {
    fn default() -> Self {
        ParamValue::String(String::new())
    }
}

impl TryFrom<serde_yaml::Value> for ParamValue {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        use serde_yaml::Value;
        match value {
            Value::Sequence(items) => items
                .into_iter()
                .map(scalar_to_string)
                .collect::<Result<Vec<_>, _>>()
                .map(ParamValue::Array),
            Value::Mapping(map) => {
                let mut object = BTreeMap::new();
                for (k, v) in map {
                    object.insert(scalar_to_string(k)?, scalar_to_string(v)?);
                }
                Ok(ParamValue::Object(object))
            }
            other => scalar_to_string(other).map(ParamValue::String),
        }
    }
}

fn scalar_to_string(value: serde_yaml::Value) -> Result<String, String> {
    use serde_yaml::Value;
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s),
        Value::Tagged(tagged) => scalar_to_string(tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => {
            Err("nested arrays and objects are not allowed in parameter values".to_string())
        }
    }
}

impl ParamValue {
    /// Type implied by the literal shape of the value.
    pub fn literal_type(&self) -> ParamType {
        match self {
            ParamValue::String(_) => ParamType::String,
            ParamValue::Array(_) => ParamType::Array,
            ParamValue::Object(_) => ParamType::Object,
        }
    }

    /// Type the value is consumed as.
    ///
    /// A string that is exactly one whole-array expansion such as
    /// `$(params.list[*])` or `$(tasks.a.results.list[*])` is an array.
    pub fn effective_type(&self) -> ParamType {
        match self {
            ParamValue::String(s) if refs::is_whole_array_expansion(s) => ParamType::Array,
            other => other.literal_type(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Every string fragment of the value, in declaration order.
    pub fn strings(&self) -> Vec<&str> {
        match self {
            ParamValue::String(s) => vec![s.as_str()],
            ParamValue::Array(items) => items.iter().map(String::as_str).collect(),
            ParamValue::Object(map) => map.values().map(String::as_str).collect(),
        }
    }
}

/// One property of an object-typed parameter or result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<ParamType>,
}

/// Parameter declaration on a Task or Pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<ParamType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, PropertySpec>>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

impl ParamSpec {
    pub fn effective_type(&self) -> ParamType {
        ParamType::effective(self.r#type.as_ref())
    }

    /// A parameter without a default must be supplied by the caller.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A caller's binding of a parameter name to a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: ParamValue,
}

impl Param {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, ParamValue::String(value.into()))
    }
}

/// String value of the named param, if present and string-typed.
pub fn string_value<'a>(params: &'a [Param], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|p| p.name == name)
        .and_then(|p| p.value.as_str())
}
