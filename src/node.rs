//! Document tree model.
//!
//! Resources are parsed with `serde_yaml` and converted into [`Node`] so the
//! walker only ever sees mappings, sequences and scalars. Scalars keep their
//! raw text plus a style hint saying whether the text is already a string
//! (`Quoted`, `Folded`) or is YAML source whose type is inferred on output
//! (`Plain`).

use serde_yaml::{Mapping, Value};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    /// Text is resolved by the YAML core scalar rules (`3` is an integer).
    Plain,
    /// Text is a string value.
    Quoted,
    /// Multi-line string value.
    Folded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    pub text: String,
    pub style: ScalarStyle,
}

impl Scalar {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: ScalarStyle::Plain,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: ScalarStyle::Quoted,
        }
    }

    /// String value, `Folded` when it spans lines.
    pub(crate) fn string(text: String) -> Self {
        let style = if text.contains('\n') {
            ScalarStyle::Folded
        } else {
            ScalarStyle::Quoted
        };
        Self { text, style }
    }

    /// Convert to a YAML value.
    pub fn to_yaml(&self) -> Value {
        match self.style {
            ScalarStyle::Quoted | ScalarStyle::Folded => Value::String(self.text.clone()),
            ScalarStyle::Plain => match parse_plain(&self.text) {
                Some(Ok(value)) => value,
                _ => Value::String(self.text.clone()),
            },
        }
    }
}

/// Parse plain scalar text as YAML.
///
/// Returns `None` when the text is not valid YAML at all, `Some(Err(value))`
/// when it parses to a mapping or sequence.
pub(crate) fn parse_plain(text: &str) -> Option<Result<Value, Value>> {
    let value: Value = serde_yaml::from_str(text).ok()?;
    match value {
        Value::Mapping(_) | Value::Sequence(_) | Value::Tagged(_) => Some(Err(value)),
        scalar => Some(Ok(scalar)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Mapping(Vec<(Node, Node)>),
    Sequence(Vec<Node>),
    Scalar(Scalar),
}

impl Node {
    /// Convert a parsed YAML value.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedNodeKind` for tagged values, which the
    /// walker cannot descend into.
    pub fn from_yaml(value: Value) -> Result<Self, Error> {
        let node = match value {
            Value::Null => Node::Scalar(Scalar::plain("null")),
            Value::Bool(b) => Node::Scalar(Scalar::plain(b.to_string())),
            Value::Number(n) => Node::Scalar(Scalar::plain(n.to_string())),
            Value::String(s) => Node::Scalar(Scalar::string(s)),
            Value::Sequence(items) => Node::Sequence(
                items
                    .into_iter()
                    .map(Node::from_yaml)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(map) => {
                let mut pairs = Vec::with_capacity(map.len());
                for (key, value) in map {
                    pairs.push((Node::from_yaml(key)?, Node::from_yaml(value)?));
                }
                Node::Mapping(pairs)
            }
            Value::Tagged(tagged) => {
                return Err(Error::UnsupportedNodeKind {
                    kind: format!("tagged value {}", tagged.tag),
                })
            }
        };
        Ok(node)
    }

    /// Convert back to a YAML value.
    pub fn to_yaml(&self) -> Value {
        match self {
            Node::Scalar(scalar) => scalar.to_yaml(),
            Node::Sequence(items) => Value::Sequence(items.iter().map(Node::to_yaml).collect()),
            Node::Mapping(pairs) => {
                let mut map = Mapping::with_capacity(pairs.len());
                for (key, value) in pairs {
                    map.insert(key.to_yaml(), value.to_yaml());
                }
                Value::Mapping(map)
            }
        }
    }

    /// Value under a string key of a mapping.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Mapping(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Text of a scalar node.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(scalar) => Some(&scalar.text),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Mapping(_) => "mapping",
            Node::Sequence(_) => "sequence",
            Node::Scalar(_) => "scalar",
        }
    }
}
