//! KRM Envsubst
//!
//! Schema-aware environment variable substitution for Kubernetes resources.
//!
//! Plain text substitution turns every value into a string, so
//! `replicas: ${REPLICAS}` would become `replicas: "3"`. This library looks up
//! the declared type of each substituted field in the resource's JSON Schema
//! and re-encodes the value accordingly.
//!
//! # Example
//!
//! ```
//! use krm_envsubst::{transform, Config, MemorySource, SchemaResolver};
//!
//! let schema = r#"{
//!     "properties": {
//!         "spec": {
//!             "properties": {
//!                 "replicas": { "type": "integer" },
//!                 "serviceName": { "type": "string" }
//!             }
//!         }
//!     }
//! }"#;
//! let resolver = SchemaResolver::offline()
//!     .with_source(MemorySource::new().with_schema("StatefulSet", "apps/v1", schema));
//! let config = Config::new()
//!     .value("REPLICAS", "3")
//!     .value("SERVICE", "1234");
//!
//! let input = "\
//! apiVersion: apps/v1
//! kind: StatefulSet
//! spec:
//!   replicas: ${REPLICAS}
//!   serviceName: ${SERVICE}
//! ";
//! let output = transform(input, config, resolver).unwrap();
//!
//! // Integer field stays a number; string field is quoted.
//! assert!(output.contains("replicas: 3\n"));
//! assert!(output.contains("serviceName: '1234'\n"));
//! ```
//!
//! # Type Decisions
//!
//! | Declared types | Result |
//! |----------------|--------|
//! | number and string (int-or-string) | left as written |
//! | integer | integer |
//! | number | number |
//! | string | string, quoted if it looks like a number, bool or null |
//! | boolean | boolean |
//! | anything else, or no schema | left as written |
//!
//! Text that would change if read back as a plain YAML scalar (a ` #`
//! comment, surrounding spaces, several lines) is always kept as a string,
//! as is anything substituted into a `|` or `>` block.
//!
//! # Field Paths
//!
//! Every scalar is addressed by its resource's `apiVersion` and `kind`
//! followed by the map keys leading to it, with `[]` standing for any sequence
//! element: `v1.Pod.spec.containers.[].ports.[].containerPort`.

mod coerce;
mod error;
mod interpolate;
mod krm;
mod loader;
mod node;
mod resolver;
mod schema;
mod subst;
mod types;
mod walker;

pub use coerce::{looks_like_bool, looks_like_null, looks_like_number, render};
pub use error::{Error, SchemaError, SubstError};
pub use interpolate::{expand, Resolution, SyntaxError, Template};
pub use krm::{transform, Batch, RESOURCE_LIST_GROUP, RESOURCE_LIST_KIND};
pub use loader::{
    is_url, BundleSource, MemorySource, RegistrySource, SchemaSource, CRDS_REGISTRY,
    NATIVE_REGISTRY,
};
pub use node::{Node, Scalar, ScalarStyle};
pub use resolver::{field_type, SchemaCache, SchemaResolver};
pub use schema::{AdditionalProperties, Items, SchemaDocument, SchemaNode};
pub use subst::{is_empty, Expander};
pub use types::{Config, FieldPath, SchemaType, ARRAY_SEGMENT};
pub use walker::Substitutor;

#[cfg(feature = "remote")]
pub use loader::default_registries;
