//! Field type resolution against resource schemas.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::error::SchemaError;
use crate::loader::SchemaSource;
use crate::schema::{AdditionalProperties, Items, SchemaDocument, SchemaNode};
use crate::types::{FieldPath, SchemaType, ARRAY_SEGMENT};

/// Parsed schemas for the lifetime of one run, keyed by kind and
/// group/version. A `None` entry records that no source had the schema.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: HashMap<(String, String), Option<SchemaDocument>>,
    hits: usize,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups answered without consulting a source.
    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn contains(&self, kind: &str, group_version: &str) -> bool {
        self.entries
            .contains_key(&(kind.to_string(), group_version.to_string()))
    }

    /// Return the cached schema, fetching and parsing it on first use.
    ///
    /// Sources are tried in order; the first hit wins. Fetch and parse
    /// errors are returned and not cached.
    fn get_or_load(
        &mut self,
        kind: &str,
        group_version: &str,
        sources: &[Box<dyn SchemaSource>],
    ) -> Result<Option<&SchemaDocument>, SchemaError> {
        let key = (kind.to_string(), group_version.to_string());
        if self.entries.contains_key(&key) {
            self.hits += 1;
        } else {
            let document = load(kind, group_version, sources)?;
            self.entries.insert(key.clone(), document);
        }
        Ok(self.entries.get(&key).and_then(Option::as_ref))
    }
}

fn load(
    kind: &str,
    group_version: &str,
    sources: &[Box<dyn SchemaSource>],
) -> Result<Option<SchemaDocument>, SchemaError> {
    for source in sources {
        let Some(bytes) = source.fetch(kind, group_version)? else {
            trace!(source = %source.describe(), kind, group_version, "schema not found");
            continue;
        };
        debug!(source = %source.describe(), kind, group_version, "loaded schema");
        let document = SchemaDocument::parse(&bytes).map_err(|message| SchemaError::Parse {
            kind: kind.to_string(),
            group_version: group_version.to_string(),
            message,
        })?;
        return Ok(Some(document));
    }
    debug!(kind, group_version, "no schema found, fields resolve to unknown");
    Ok(None)
}

/// Looks up the declared scalar type of resource fields.
pub struct SchemaResolver {
    sources: Vec<Box<dyn SchemaSource>>,
    cache: SchemaCache,
}

impl SchemaResolver {
    /// Create a resolver consulting `sources` in priority order.
    pub fn new(sources: Vec<Box<dyn SchemaSource>>) -> Self {
        Self {
            sources,
            cache: SchemaCache::new(),
        }
    }

    /// A resolver without sources: every field is `Unknown`.
    pub fn offline() -> Self {
        Self::new(Vec::new())
    }

    /// Append a lower-priority source.
    pub fn with_source(mut self, source: impl SchemaSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    /// Declared type of `path` (apiVersion, kind, then fields).
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` when fetching or parsing the schema fails.
    pub fn resolve_path(&mut self, path: &FieldPath) -> Result<SchemaType, SchemaError> {
        match (path.api_version(), path.kind()) {
            (Some(group_version), Some(kind)) => {
                self.resolve_type(kind, group_version, path.fields())
            }
            _ => Ok(SchemaType::Unknown),
        }
    }

    /// Declared type of `fields` within the schema for `kind` in
    /// `group_version`.
    ///
    /// Labels and annotations are always strings. Resources without a kind
    /// or apiVersion are never looked up.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` when fetching or parsing the schema fails.
    pub fn resolve_type(
        &mut self,
        kind: &str,
        group_version: &str,
        fields: &[String],
    ) -> Result<SchemaType, SchemaError> {
        if is_string_map_entry(fields) {
            return Ok(SchemaType::String);
        }
        if kind.is_empty() || group_version.is_empty() {
            return Ok(SchemaType::Unknown);
        }

        let resolved = match self.cache.get_or_load(kind, group_version, &self.sources)? {
            Some(document) => field_type(document, fields),
            None => SchemaType::Unknown,
        };
        debug!(kind, group_version, path = %fields.join("."), %resolved, "resolved field type");
        Ok(resolved)
    }
}

/// `metadata.labels.<key>` and `metadata.annotations.<key>`.
fn is_string_map_entry(fields: &[String]) -> bool {
    matches!(
        fields,
        [metadata, map, _] if metadata == "metadata" && (map == "labels" || map == "annotations")
    )
}

/// Declared type at `fields` within `document`.
pub fn field_type(document: &SchemaDocument, fields: &[String]) -> SchemaType {
    walk(document, document.root(), fields)
}

fn walk(document: &SchemaDocument, node: &SchemaNode, fields: &[String]) -> SchemaType {
    let Some(node) = document.deref(node) else {
        return SchemaType::Unknown;
    };

    let Some((next, rest)) = fields.split_first() else {
        return decide(&candidates(document, node));
    };

    let child = if next == ARRAY_SEGMENT {
        match &node.items {
            Some(Items::Single(schema)) => schema.as_ref(),
            // Only the first positional schema is consulted.
            Some(Items::Tuple(schemas)) => match schemas.first() {
                Some(schema) => schema,
                None => return SchemaType::Unknown,
            },
            Some(Items::Flag(_)) | None => return SchemaType::Unknown,
        }
    } else {
        match node.property(next) {
            Some(schema) => schema,
            None => match &node.additional_properties {
                Some(AdditionalProperties::Schema(schema)) => schema.as_ref(),
                Some(AdditionalProperties::Flag(_)) | None => return SchemaType::Unknown,
            },
        }
    };

    walk(document, child, rest)
}

fn candidates(document: &SchemaDocument, node: &SchemaNode) -> BTreeSet<SchemaType> {
    let mut types: BTreeSet<SchemaType> = node.types.iter().copied().collect();
    if !types.is_empty() {
        return types;
    }

    for alternative in &node.any_of {
        if let Some(alternative) = document.deref(alternative) {
            types.extend(alternative.types.iter().copied());
        }
    }
    if node.items.is_some() {
        types.insert(SchemaType::Array);
    }
    if node.properties.is_some() {
        types.insert(SchemaType::Object);
    }
    types
}

/// Pick the type to encode as. Ambiguous number-or-string fields are left
/// alone so the user's own formatting decides.
fn decide(types: &BTreeSet<SchemaType>) -> SchemaType {
    if types.contains(&SchemaType::Number) && types.contains(&SchemaType::String) {
        SchemaType::Unknown
    } else if types.contains(&SchemaType::Integer) {
        SchemaType::Integer
    } else if types.contains(&SchemaType::Number) {
        SchemaType::Number
    } else if types.contains(&SchemaType::String) {
        SchemaType::String
    } else if types.contains(&SchemaType::Bool) {
        SchemaType::Bool
    } else {
        SchemaType::Unknown
    }
}
