//! Parsed JSON Schema documents.
//!
//! Only the keywords that matter for finding a field's scalar type are kept:
//! `type`, `$ref`, `properties`, `additionalProperties`, `items` (and the
//! draft 2020-12 `prefixItems`) and `anyOf`. Everything else is ignored.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::types::SchemaType;

/// Maximum `$ref` hops followed from a single node.
const MAX_REF_HOPS: usize = 32;

/// A schema node. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaNode {
    /// Declared `type` keyword values.
    pub types: Vec<SchemaType>,
    /// Raw `$ref` target.
    pub reference: Option<String>,
    pub properties: Option<Vec<(String, SchemaNode)>>,
    pub additional_properties: Option<AdditionalProperties>,
    pub items: Option<Items>,
    pub any_of: Vec<SchemaNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
    Flag(bool),
    Schema(Box<SchemaNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    /// One schema for every element.
    Single(Box<SchemaNode>),
    /// Positional schemas (`items: [...]` or `prefixItems`).
    Tuple(Vec<SchemaNode>),
    /// `items: true` / `items: false`.
    Flag(bool),
}

impl SchemaNode {
    pub fn property(&self, key: &str) -> Option<&SchemaNode> {
        self.properties
            .as_ref()?
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, node)| node)
    }
}

/// A parsed schema with its internal `$ref` targets.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    root: SchemaNode,
    targets: HashMap<String, SchemaNode>,
}

impl SchemaDocument {
    /// Parse raw schema bytes.
    ///
    /// # Errors
    ///
    /// Returns a message describing the problem if the bytes are not JSON,
    /// a keyword has the wrong shape, or an internal `$ref` points nowhere.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let raw: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        Self::from_value(&raw)
    }

    pub fn from_value(raw: &Value) -> Result<Self, String> {
        let mut refs = Vec::new();
        let root = parse_node(raw, "#", &mut refs)?;

        let mut targets = HashMap::new();
        while let Some(pointer) = refs.pop() {
            if !pointer.starts_with("#/") || targets.contains_key(&pointer) {
                continue;
            }
            let target = navigate_pointer(raw, &pointer)
                .ok_or_else(|| format!("$ref target not found: {}", pointer))?;
            let node = parse_node(target, &pointer, &mut refs)?;
            targets.insert(pointer, node);
        }

        Ok(Self { root, targets })
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// Follow `$ref` from `node` until reaching a node without one.
    ///
    /// Returns `None` for external references and reference cycles, which
    /// cannot be resolved statically.
    pub fn deref<'a>(&'a self, node: &'a SchemaNode) -> Option<&'a SchemaNode> {
        let mut current = node;
        for _ in 0..MAX_REF_HOPS {
            let Some(pointer) = &current.reference else {
                return Some(current);
            };
            current = if pointer == "#" {
                &self.root
            } else if let Some(target) = self.targets.get(pointer) {
                target
            } else {
                warn!(reference = %pointer, "cannot resolve schema reference");
                return None;
            };
        }
        warn!("schema reference chain too long");
        None
    }
}

/// Resolve a JSON Pointer fragment (`#/definitions/foo`) within `root`.
fn navigate_pointer<'a>(root: &'a Value, fragment: &str) -> Option<&'a Value> {
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Some(root);
    }

    let mut current = root;
    for part in path.split('/') {
        // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
        let key = part.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            other => other.get(&key)?,
        };
    }
    Some(current)
}

fn parse_node(value: &Value, at: &str, refs: &mut Vec<String>) -> Result<SchemaNode, String> {
    let obj = match value {
        Value::Object(obj) => obj,
        // Boolean schemas carry no type information.
        Value::Bool(_) => return Ok(SchemaNode::default()),
        other => return Err(format!("{}: expected schema object, got {}", at, other)),
    };

    let mut node = SchemaNode {
        types: parse_types(obj, at)?,
        ..SchemaNode::default()
    };

    if let Some(reference) = obj.get("$ref") {
        let reference = reference
            .as_str()
            .ok_or_else(|| format!("{}/$ref: expected string", at))?;
        refs.push(reference.to_string());
        node.reference = Some(reference.to_string());
    }

    if let Some(properties) = obj.get("properties") {
        let properties = properties
            .as_object()
            .ok_or_else(|| format!("{}/properties: expected object", at))?;
        let mut parsed = Vec::with_capacity(properties.len());
        for (name, schema) in properties {
            let child = parse_node(schema, &format!("{}/properties/{}", at, name), refs)?;
            parsed.push((name.clone(), child));
        }
        node.properties = Some(parsed);
    }

    node.additional_properties = match obj.get("additionalProperties") {
        None => None,
        Some(Value::Bool(flag)) => Some(AdditionalProperties::Flag(*flag)),
        Some(schema) => Some(AdditionalProperties::Schema(Box::new(parse_node(
            schema,
            &format!("{}/additionalProperties", at),
            refs,
        )?))),
    };

    node.items = match (obj.get("items"), obj.get("prefixItems")) {
        (Some(Value::Bool(flag)), _) => Some(Items::Flag(*flag)),
        (Some(Value::Array(schemas)), _) | (None, Some(Value::Array(schemas))) => {
            Some(Items::Tuple(parse_list(schemas, &format!("{}/items", at), refs)?))
        }
        (Some(schema), _) => Some(Items::Single(Box::new(parse_node(
            schema,
            &format!("{}/items", at),
            refs,
        )?))),
        (None, Some(_)) => return Err(format!("{}/prefixItems: expected array", at)),
        (None, None) => None,
    };

    if let Some(any_of) = obj.get("anyOf") {
        let any_of = any_of
            .as_array()
            .ok_or_else(|| format!("{}/anyOf: expected array", at))?;
        node.any_of = parse_list(any_of, &format!("{}/anyOf", at), refs)?;
    }

    Ok(node)
}

fn parse_list(
    schemas: &[Value],
    at: &str,
    refs: &mut Vec<String>,
) -> Result<Vec<SchemaNode>, String> {
    schemas
        .iter()
        .enumerate()
        .map(|(i, schema)| parse_node(schema, &format!("{}/{}", at, i), refs))
        .collect()
}

fn parse_types(obj: &Map<String, Value>, at: &str) -> Result<Vec<SchemaType>, String> {
    match obj.get("type") {
        None => Ok(Vec::new()),
        Some(Value::String(name)) => Ok(SchemaType::from_json_name(name).into_iter().collect()),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| {
                name.as_str()
                    .ok_or_else(|| format!("{}/type: expected string entries", at))
            })
            .filter_map(|name| match name {
                Ok(name) => SchemaType::from_json_name(name).map(Ok),
                Err(e) => Some(Err(e)),
            })
            .collect(),
        Some(_) => Err(format!("{}/type: expected string or array", at)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> SchemaDocument {
        SchemaDocument::from_value(&value).unwrap()
    }

    #[test]
    fn parses_types_and_properties() {
        let doc = doc(json!({
            "type": "object",
            "properties": {
                "replicas": { "type": "integer" },
                "paused": { "type": ["boolean", "null"] }
            }
        }));
        let root = doc.root();
        assert_eq!(root.types, vec![SchemaType::Object]);
        assert_eq!(
            root.property("replicas").unwrap().types,
            vec![SchemaType::Integer]
        );
        assert_eq!(
            root.property("paused").unwrap().types,
            vec![SchemaType::Bool, SchemaType::Null]
        );
        assert!(root.property("missing").is_none());
    }

    #[test]
    fn items_variants() {
        let doc = doc(json!({
            "properties": {
                "single": { "items": { "type": "string" } },
                "tuple": { "items": [{ "type": "integer" }, { "type": "string" }] },
                "prefix": { "prefixItems": [{ "type": "number" }] },
                "flag": { "items": false }
            }
        }));
        let root = doc.root();
        assert!(matches!(
            root.property("single").unwrap().items,
            Some(Items::Single(_))
        ));
        assert!(matches!(
            &root.property("tuple").unwrap().items,
            Some(Items::Tuple(t)) if t.len() == 2
        ));
        assert!(matches!(
            &root.property("prefix").unwrap().items,
            Some(Items::Tuple(t)) if t.len() == 1
        ));
        assert_eq!(
            root.property("flag").unwrap().items,
            Some(Items::Flag(false))
        );
    }

    #[test]
    fn additional_properties_variants() {
        let doc = doc(json!({
            "properties": {
                "labels": { "additionalProperties": { "type": "string" } },
                "open": { "additionalProperties": true }
            }
        }));
        let root = doc.root();
        assert!(matches!(
            root.property("labels").unwrap().additional_properties,
            Some(AdditionalProperties::Schema(_))
        ));
        assert_eq!(
            root.property("open").unwrap().additional_properties,
            Some(AdditionalProperties::Flag(true))
        );
    }

    #[test]
    fn internal_refs_are_resolved() {
        let doc = doc(json!({
            "definitions": {
                "port": { "$ref": "#/definitions/int" },
                "int": { "type": "integer" },
                "a/b": { "type": "string" }
            },
            "properties": {
                "port": { "$ref": "#/definitions/port" },
                "escaped": { "$ref": "#/definitions/a~1b" },
                "self": { "$ref": "#" }
            },
            "type": "object"
        }));
        let root = doc.root();
        let port = doc.deref(root.property("port").unwrap()).unwrap();
        assert_eq!(port.types, vec![SchemaType::Integer]);

        let escaped = doc.deref(root.property("escaped").unwrap()).unwrap();
        assert_eq!(escaped.types, vec![SchemaType::String]);

        let this = doc.deref(root.property("self").unwrap()).unwrap();
        assert_eq!(this.types, vec![SchemaType::Object]);
    }

    #[test]
    fn dangling_internal_ref_is_an_error() {
        let result = SchemaDocument::from_value(&json!({
            "properties": { "x": { "$ref": "#/definitions/missing" } }
        }));
        assert!(result.unwrap_err().contains("#/definitions/missing"));
    }

    #[test]
    fn external_and_cyclic_refs_do_not_resolve() {
        let doc = doc(json!({
            "definitions": {
                "a": { "$ref": "#/definitions/b" },
                "b": { "$ref": "#/definitions/a" }
            },
            "properties": {
                "ext": { "$ref": "https://example.com/schema.json" },
                "cycle": { "$ref": "#/definitions/a" }
            }
        }));
        let root = doc.root();
        assert!(doc.deref(root.property("ext").unwrap()).is_none());
        assert!(doc.deref(root.property("cycle").unwrap()).is_none());
    }

    #[test]
    fn malformed_schemas_are_errors() {
        assert!(SchemaDocument::parse(b"not json").is_err());
        assert!(SchemaDocument::from_value(&json!({ "type": 5 })).is_err());
        assert!(SchemaDocument::from_value(&json!({ "properties": [] })).is_err());
        assert!(SchemaDocument::from_value(&json!({ "anyOf": {} })).is_err());
        assert!(SchemaDocument::from_value(&json!("string")).is_err());
    }

    #[test]
    fn unknown_type_names_are_ignored() {
        let doc = doc(json!({ "type": ["string", "any"] }));
        assert_eq!(doc.root().types, vec![SchemaType::String]);
    }
}
