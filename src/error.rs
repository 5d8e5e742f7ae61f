//! Error types for substitution, schema lookup and manifest I/O.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::FieldPath;

/// Errors raised while expanding and re-encoding a single scalar.
#[derive(Debug, Error)]
pub enum SubstError {
    #[error("could not envsubst `{text}`: {message}")]
    Syntax { text: String, message: String },

    #[error("value `{text}` evaluated to empty string. Did you forget to set an environment variable?")]
    Empty { text: String },

    #[error("invalid output: `{text}` did not evaluate to a scalar")]
    InvalidScalarOutput { text: String },

    #[error("key `{key}` appears more than once after substitution")]
    DuplicateKey { key: String },
}

/// Errors raised while fetching or parsing resource schemas.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid schema template '{template}': {message}")]
    InvalidTemplate { template: String, message: String },

    #[error("could not parse schema for {kind} {group_version}: {message}")]
    Parse {
        kind: String,
        group_version: String,
        message: String,
    },
}

impl SchemaError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SchemaError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            SchemaError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Top-level error for processing a resource or a batch of resources.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{source} (at {path})")]
    Subst {
        path: FieldPath,
        #[source]
        source: SubstError,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("unsupported node kind: {kind}")]
    UnsupportedNodeKind { kind: String },

    #[error("invalid YAML input: {source}")]
    InvalidYaml {
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("invalid ResourceList: {message}")]
    InvalidResourceList { message: String },

    #[error("cannot read input: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Subst { .. } => 1,
            Error::Schema(e) => e.exit_code(),
            Error::Io { .. } => 3,
            _ => 2,
        }
    }

    /// The field path at which a substitution failed, if any.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            Error::Subst { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_names_original_text() {
        let err = SubstError::Empty {
            text: "${MISSING}".into(),
        };
        assert_eq!(
            err.to_string(),
            "value `${MISSING}` evaluated to empty string. Did you forget to set an environment variable?"
        );
    }

    #[test]
    fn subst_error_carries_path() {
        let path = FieldPath::root("v1", "Pod").child("spec").child("hostname");
        let err = Error::Subst {
            path: path.clone(),
            source: SubstError::InvalidScalarOutput { text: "${X}".into() },
        };
        assert_eq!(err.path(), Some(&path));
        assert!(err.to_string().contains("(at v1.Pod.spec.hostname)"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn exit_codes() {
        let err = Error::Schema(SchemaError::ReadError {
            path: PathBuf::from("schemas/pod-v1.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        assert_eq!(err.exit_code(), 3);

        let err = Error::Schema(SchemaError::Parse {
            kind: "Pod".into(),
            group_version: "v1".into(),
            message: "expected value".into(),
        });
        assert_eq!(err.exit_code(), 2);

        let err = Error::UnsupportedNodeKind {
            kind: "tagged value".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }
}
