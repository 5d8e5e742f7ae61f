//! Reading and writing resource batches.
//!
//! Input is either a KRM function `ResourceList` or a plain stream of YAML
//! documents. Output has the same shape as the input.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::Error;
use crate::node::Node;
use crate::resolver::SchemaResolver;
use crate::types::Config;
use crate::walker::Substitutor;

pub const RESOURCE_LIST_KIND: &str = "ResourceList";
pub const RESOURCE_LIST_GROUP: &str = "config.kubernetes.io";

#[derive(Debug, Clone, PartialEq)]
enum Envelope {
    /// Top-level fields of the list other than `items`.
    ResourceList(Mapping),
    Stream,
}

/// A batch of resources plus the envelope they arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    envelope: Envelope,
    pub items: Vec<Node>,
    /// Settings from the list's `functionConfig`, if any.
    pub function_config: Option<Config>,
}

impl Batch {
    /// Parse a ResourceList or a `---` separated document stream.
    ///
    /// Empty documents in a stream are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidYaml` for malformed input, `Error::InvalidResourceList`
    /// when a ResourceList's `items` is not a sequence and `Error::InvalidConfig`
    /// when its `functionConfig` does not describe substitution settings.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_str(input) {
            let value = Value::deserialize(document).map_err(|source| Error::InvalidYaml { source })?;
            if !value.is_null() {
                documents.push(value);
            }
        }

        match documents.pop() {
            Some(Value::Mapping(list)) if documents.is_empty() && is_resource_list(&list) => {
                return Self::from_resource_list(list);
            }
            Some(last) => documents.push(last),
            None => {}
        }

        debug!(documents = documents.len(), "read document stream");
        Ok(Self {
            envelope: Envelope::Stream,
            items: documents
                .into_iter()
                .map(Node::from_yaml)
                .collect::<Result<_, _>>()?,
            function_config: None,
        })
    }

    fn from_resource_list(mut list: Mapping) -> Result<Self, Error> {
        let items = match list.get_mut("items").map(std::mem::take) {
            Some(Value::Sequence(items)) => items
                .into_iter()
                .map(Node::from_yaml)
                .collect::<Result<Vec<_>, _>>()?,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(Error::InvalidResourceList {
                    message: "items must be a sequence".to_string(),
                })
            }
        };

        let function_config = match list.get("functionConfig") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                serde_yaml::from_value::<Config>(raw.clone()).map_err(|e| Error::InvalidConfig {
                    message: format!("functionConfig: {}", e),
                })?,
            ),
        };

        debug!(items = items.len(), function_config = function_config.is_some(), "read ResourceList");
        Ok(Self {
            envelope: Envelope::ResourceList(list),
            items,
            function_config,
        })
    }

    pub fn is_resource_list(&self) -> bool {
        matches!(self.envelope, Envelope::ResourceList(_))
    }

    /// Serialize in the shape the batch was read in.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidYaml` if serialization fails.
    pub fn to_yaml_string(&self) -> Result<String, Error> {
        let to_string =
            |value: &Value| serde_yaml::to_string(value).map_err(|source| Error::InvalidYaml { source });

        match &self.envelope {
            Envelope::ResourceList(list) => {
                let mut list = list.clone();
                list.insert(
                    Value::from("items"),
                    Value::Sequence(self.items.iter().map(Node::to_yaml).collect()),
                );
                to_string(&Value::Mapping(list))
            }
            Envelope::Stream => {
                let documents = self
                    .items
                    .iter()
                    .map(|item| to_string(&item.to_yaml()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(documents.join("---\n"))
            }
        }
    }
}

fn is_resource_list(document: &Mapping) -> bool {
    let kind = document.get("kind").and_then(Value::as_str);
    let api_version = document.get("apiVersion").and_then(Value::as_str);
    kind == Some(RESOURCE_LIST_KIND)
        && api_version.is_some_and(|gv| gv.split('/').next() == Some(RESOURCE_LIST_GROUP))
}

/// Substitute into every resource of `input` and serialize the result.
///
/// A ResourceList's `functionConfig` is applied first and `config` is merged
/// over it.
///
/// # Errors
///
/// Returns the first parse, substitution or schema error.
pub fn transform(input: &str, config: Config, resolver: SchemaResolver) -> Result<String, Error> {
    let mut batch = Batch::parse(input)?;
    let config = match batch.function_config.take() {
        Some(function_config) => function_config.merge(config),
        None => config,
    };

    let mut substitutor = Substitutor::new(config, resolver);
    substitutor.process_all(&mut batch.items)?;
    batch.to_yaml_string()
}
