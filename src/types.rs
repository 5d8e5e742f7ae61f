//! Core types for schema-aware substitution.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Path segment standing for "any element of a sequence".
pub const ARRAY_SEGMENT: &str = "[]";

/// Structural address of a node from the resource root.
///
/// The first two segments are the resource's `apiVersion` and `kind`; the
/// rest are literal map keys or [`ARRAY_SEGMENT`]. A path is never mutated:
/// descending returns a new path, so every node sees exactly its own lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Path of a resource root.
    pub fn root(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self(vec![api_version.into(), kind.into()])
    }

    /// Path of a map value under `key`.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend(self.0.iter().cloned());
        segments.push(key.into());
        Self(segments)
    }

    /// Path shared by every element of a sequence.
    pub fn element(&self) -> Self {
        self.child(ARRAY_SEGMENT)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn api_version(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    /// Segments below the resource root (`path[2..]`).
    pub fn fields(&self) -> &[String] {
        self.0.get(2..).unwrap_or(&[])
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Substitution settings.
///
/// Deserializes from the same keys the plugin config file and a KRM
/// `functionConfig` use. Unknown keys (`apiVersion`, `metadata`, ...) are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Accept substitutions that evaluate to an empty string.
    #[serde(default)]
    pub allow_empty: bool,
    /// Variables never substituted. Ignored when `included_vars` is non-empty.
    #[serde(default, rename = "excludedVariableNames")]
    pub excluded_vars: BTreeSet<String>,
    /// When non-empty, the only variables substituted.
    #[serde(default, rename = "includedVariableNames")]
    pub included_vars: BTreeSet<String>,
    /// Explicit values, taking precedence over the environment.
    #[serde(default, deserialize_with = "string_map")]
    pub values: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    pub fn include(mut self, name: impl Into<String>) -> Self {
        self.included_vars.insert(name.into());
        self
    }

    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excluded_vars.insert(name.into());
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Whether `name` may be substituted at all.
    ///
    /// A non-empty include list alone decides; otherwise everything not
    /// excluded is eligible.
    pub fn is_eligible(&self, name: &str) -> bool {
        if self.included_vars.is_empty() {
            !self.excluded_vars.contains(name)
        } else {
            self.included_vars.contains(name)
        }
    }

    /// Value for `name`: explicit values, then the process environment,
    /// then the empty string.
    pub fn lookup(&self, name: &str) -> String {
        match self.values.get(name) {
            Some(value) => value.clone(),
            None => std::env::var(name).unwrap_or_default(),
        }
    }

    /// Overlay `other` on top of `self`. Sets are unioned, values from
    /// `other` win, and `allow_empty` is enabled if either enables it.
    pub fn merge(mut self, other: Config) -> Self {
        self.allow_empty |= other.allow_empty;
        self.excluded_vars.extend(other.excluded_vars);
        self.included_vars.extend(other.included_vars);
        self.values.extend(other.values);
        self
    }
}

/// Accept scalar values of any YAML type (`PORT: 8080`) as strings.
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw: Option<BTreeMap<String, serde_yaml::Value>> = Option::deserialize(deserializer)?;
    let mut values = BTreeMap::new();
    for (name, value) in raw.unwrap_or_default() {
        let text = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Null => String::new(),
            _ => {
                return Err(D::Error::custom(format!(
                    "value for '{}' must be a scalar",
                    name
                )))
            }
        };
        values.insert(name, text);
    }
    Ok(values)
}

/// Scalar type a schema declares for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SchemaType {
    #[default]
    Unknown,
    String,
    Integer,
    Number,
    Bool,
    Array,
    Object,
    Null,
}

impl SchemaType {
    /// Parse a JSON Schema `type` keyword value.
    ///
    /// Returns `None` for names outside the JSON Schema vocabulary.
    pub fn from_json_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(SchemaType::String),
            "integer" => Some(SchemaType::Integer),
            "number" => Some(SchemaType::Number),
            "boolean" => Some(SchemaType::Bool),
            "array" => Some(SchemaType::Array),
            "object" => Some(SchemaType::Object),
            "null" => Some(SchemaType::Null),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaType::Unknown => "unknown",
            SchemaType::String => "string",
            SchemaType::Integer => "integer",
            SchemaType::Number => "number",
            SchemaType::Bool => "boolean",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
            SchemaType::Null => "null",
        };
        f.write_str(name)
    }
}
