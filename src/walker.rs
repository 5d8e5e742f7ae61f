//! Depth-first walk over resource documents.

use std::collections::HashSet;

use tracing::debug;

use crate::coerce::render;
use crate::error::{Error, SubstError};
use crate::node::Node;
use crate::resolver::SchemaResolver;
use crate::subst::Expander;
use crate::types::{Config, FieldPath};

/// Substitutes variables into resources, keeping field types intact.
///
/// # Example
///
/// ```
/// use krm_envsubst::{Config, MemorySource, Node, SchemaResolver, Substitutor};
///
/// let schema = r#"{
///     "properties": {
///         "spec": { "properties": { "replicas": { "type": "integer" } } }
///     }
/// }"#;
/// let resolver = SchemaResolver::offline()
///     .with_source(MemorySource::new().with_schema("Deployment", "apps/v1", schema));
/// let config = Config::new().value("REPLICAS", "3");
/// let mut substitutor = Substitutor::new(config, resolver);
///
/// let yaml = "apiVersion: apps/v1\nkind: Deployment\nspec:\n  replicas: ${REPLICAS}\n";
/// let mut doc = Node::from_yaml(serde_yaml::from_str(yaml).unwrap()).unwrap();
/// substitutor.process(&mut doc).unwrap();
///
/// let out = doc.to_yaml();
/// assert_eq!(out["spec"]["replicas"], serde_yaml::Value::from(3));
/// ```
pub struct Substitutor {
    config: Config,
    resolver: SchemaResolver,
}

impl Substitutor {
    pub fn new(config: Config, resolver: SchemaResolver) -> Self {
        Self { config, resolver }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    /// Substitute into every resource of a batch, stopping at the first error.
    ///
    /// # Errors
    ///
    /// See [`Substitutor::process`].
    pub fn process_all(&mut self, resources: &mut [Node]) -> Result<(), Error> {
        for resource in resources.iter_mut() {
            self.process(resource)?;
        }
        Ok(())
    }

    /// Substitute into one resource in place.
    ///
    /// Field paths start at the resource's own `apiVersion` and `kind`, read
    /// before any substitution happens.
    ///
    /// # Errors
    ///
    /// Returns `Error::Subst` for expansion and encoding failures (with the
    /// field path), and `Error::Schema` when a schema cannot be fetched or
    /// parsed.
    pub fn process(&mut self, resource: &mut Node) -> Result<(), Error> {
        let api_version = resource
            .get("apiVersion")
            .and_then(Node::as_str)
            .unwrap_or_default();
        let kind = resource.get("kind").and_then(Node::as_str).unwrap_or_default();
        let path = FieldPath::root(api_version, kind);
        debug!(%api_version, %kind, "processing resource");

        self.walk(resource, &path)
    }

    fn walk(&mut self, node: &mut Node, path: &FieldPath) -> Result<(), Error> {
        match node {
            Node::Mapping(pairs) => {
                let mut seen = HashSet::with_capacity(pairs.len());
                for (key, value) in pairs.iter_mut() {
                    self.walk(key, path)?;
                    let key_text = match key {
                        Node::Scalar(scalar) => scalar.text.trim_end_matches('\n').to_string(),
                        other => {
                            return Err(Error::UnsupportedNodeKind {
                                kind: format!("{} as mapping key at {}", other.kind_name(), path),
                            })
                        }
                    };
                    if !seen.insert(key.to_yaml()) {
                        return Err(Error::Subst {
                            path: path.clone(),
                            source: SubstError::DuplicateKey { key: key_text },
                        });
                    }
                    self.walk(value, &path.child(key_text))?;
                }
                Ok(())
            }
            Node::Sequence(items) => {
                let element = path.element();
                for item in items.iter_mut() {
                    self.walk(item, &element)?;
                }
                Ok(())
            }
            Node::Scalar(scalar) => {
                let expander = Expander::new(&self.config);
                let Some(text) = expander
                    .expand(&scalar.text, path)
                    .map_err(|source| Error::Subst {
                        path: path.clone(),
                        source,
                    })?
                else {
                    return Ok(());
                };

                let inferred = self.resolver.resolve_path(path)?;
                *scalar = render(&text, inferred, &scalar.text).map_err(|source| Error::Subst {
                    path: path.clone(),
                    source,
                })?;
                Ok(())
            }
        }
    }
}
