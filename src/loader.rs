//! Schema sources.
//!
//! A [`SchemaSource`] maps a resource kind and group/version to raw JSON
//! Schema bytes. Sources are consulted in priority order by the resolver;
//! `Ok(None)` means "not here, try the next one".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SchemaError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Standalone schemas for built-in Kubernetes kinds.
pub const NATIVE_REGISTRY: &str = "https://raw.githubusercontent.com/yannh/kubernetes-json-schema/master/{{.NormalizedKubernetesVersion}}-standalone{{.StrictSuffix}}/{{.ResourceKind}}{{.KindSuffix}}.json";

/// Community catalog of CRD schemas.
pub const CRDS_REGISTRY: &str =
    "https://raw.githubusercontent.com/datreeio/CRDs-catalog/main/{{.Group}}/{{.ResourceKind}}_{{.ResourceAPIVersion}}.json";

const PLACEHOLDERS: &[&str] = &[
    "NormalizedKubernetesVersion",
    "StrictSuffix",
    "ResourceKind",
    "KindSuffix",
    "Group",
    "ResourceAPIVersion",
];

/// Supplies raw schema documents.
pub trait SchemaSource {
    /// Human-readable description for diagnostics.
    fn describe(&self) -> String;

    /// Fetch the schema for `kind` in `group_version` (e.g. `apps/v1`).
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` for transport or I/O failures. A missing schema
    /// is `Ok(None)`, not an error.
    fn fetch(&self, kind: &str, group_version: &str) -> Result<Option<Vec<u8>>, SchemaError>;
}

/// Split `apps/v1` into `(Some("apps"), "v1")` and `v1` into `(None, "v1")`.
fn split_group_version(group_version: &str) -> (Option<&str>, &str) {
    match group_version.split_once('/') {
        Some((group, version)) => (Some(group), version),
        None => (None, group_version),
    }
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Read a schema file, treating a missing file as "not found".
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SchemaError> {
    if !path.exists() {
        return Ok(None);
    }
    std::fs::read(path)
        .map(Some)
        .map_err(|source| SchemaError::ReadError {
            path: path.to_path_buf(),
            source,
        })
}

/// Offline bundle of schemas laid out on disk.
///
/// ```text
/// <root>/native/master-standalone/pod-v1.json
/// <root>/native/master-standalone/deployment-apps-v1.json
/// <root>/crds/cert-manager.io/certificate_v1.json
/// ```
///
/// Native schemas are named after the first label of the group, so
/// `networking.k8s.io/v1` Ingress is `ingress-networking-v1.json`. Kinds in
/// dotted groups that are not found there are looked up under `crds/`.
#[derive(Debug, Clone)]
pub struct BundleSource {
    root: PathBuf,
}

impl BundleSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locations searched for `kind` in `group_version`, in order.
    pub fn schema_paths(&self, kind: &str, group_version: &str) -> Vec<PathBuf> {
        let kind = kind.to_lowercase();
        let (group, version) = split_group_version(group_version);
        let native = match group {
            Some(group) => {
                let label = group.split('.').next().unwrap_or(group);
                format!("{}-{}-{}.json", kind, label.to_lowercase(), version)
            }
            None => format!("{}-{}.json", kind, version),
        };

        let mut paths = vec![self.root.join("native").join("master-standalone").join(native)];
        if let Some(group) = group.filter(|group| group.contains('.')) {
            paths.push(
                self.root
                    .join("crds")
                    .join(group)
                    .join(format!("{}_{}.json", kind, version)),
            );
        }
        paths
    }
}

impl SchemaSource for BundleSource {
    fn describe(&self) -> String {
        format!("bundle {}", self.root.display())
    }

    fn fetch(&self, kind: &str, group_version: &str) -> Result<Option<Vec<u8>>, SchemaError> {
        for path in self.schema_paths(kind, group_version) {
            debug!(path = %path.display(), "looking up bundled schema");
            if let Some(bytes) = read_optional(&path)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

/// Schemas held in memory, keyed by kind and group/version.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    schemas: HashMap<(String, String), Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(
        mut self,
        kind: impl Into<String>,
        group_version: impl Into<String>,
        schema: impl Into<Vec<u8>>,
    ) -> Self {
        self.insert(kind, group_version, schema);
        self
    }

    pub fn insert(
        &mut self,
        kind: impl Into<String>,
        group_version: impl Into<String>,
        schema: impl Into<Vec<u8>>,
    ) {
        self.schemas
            .insert((kind.into(), group_version.into()), schema.into());
    }
}

impl SchemaSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} schemas)", self.schemas.len())
    }

    fn fetch(&self, kind: &str, group_version: &str) -> Result<Option<Vec<u8>>, SchemaError> {
        Ok(self
            .schemas
            .get(&(kind.to_string(), group_version.to_string()))
            .cloned())
    }
}

/// Schema registry addressed by a location template.
///
/// Templates use the kubeconform placeholders:
///
/// | Placeholder | `Deployment`, `apps/v1` |
/// |-------------|-------------------------|
/// | `{{.NormalizedKubernetesVersion}}` | `master` (or `v1.29.0`) |
/// | `{{.StrictSuffix}}` | `-strict` in strict mode, else empty |
/// | `{{.ResourceKind}}` | `deployment` |
/// | `{{.KindSuffix}}` | `-apps-v1` |
/// | `{{.Group}}` | `apps` |
/// | `{{.ResourceAPIVersion}}` | `v1` |
///
/// A rendered location starting with `http://` or `https://` is fetched over
/// HTTP (requires the `remote` feature), where a 404 means "not found";
/// anything else is read as a file path.
#[derive(Debug, Clone)]
pub struct RegistrySource {
    template: String,
    kubernetes_version: String,
    strict: bool,
    #[cfg(feature = "remote")]
    client: reqwest::blocking::Client,
}

impl RegistrySource {
    /// Create a registry source for `template`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::InvalidTemplate` if the template uses an unknown
    /// placeholder, or is a URL while the `remote` feature is disabled.
    pub fn new(template: impl Into<String>) -> Result<Self, SchemaError> {
        let template = template.into();
        validate_template(&template)?;

        #[cfg(not(feature = "remote"))]
        if is_url(&template) {
            return Err(SchemaError::InvalidTemplate {
                template,
                message: "remote schema locations require the `remote` feature".to_string(),
            });
        }

        Ok(Self {
            #[cfg(feature = "remote")]
            client: reqwest::blocking::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .map_err(|source| SchemaError::NetworkError {
                    url: template.clone(),
                    source,
                })?,
            template,
            kubernetes_version: "master".to_string(),
            strict: false,
        })
    }

    /// Kubernetes version used for `{{.NormalizedKubernetesVersion}}`.
    pub fn kubernetes_version(mut self, version: impl Into<String>) -> Self {
        self.kubernetes_version = version.into();
        self
    }

    /// Use `-strict` schema variants.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Render the template for `kind` in `group_version`.
    pub fn location(&self, kind: &str, group_version: &str) -> String {
        let normalized_version = if self.kubernetes_version == "master"
            || self.kubernetes_version.starts_with('v')
        {
            self.kubernetes_version.clone()
        } else {
            format!("v{}", self.kubernetes_version)
        };

        let (group, version) = split_group_version(group_version);
        let group_label = group.unwrap_or(version).split('.').next().unwrap_or("");
        let kind_suffix = match group {
            Some(_) => format!("-{}-{}", group_label.to_lowercase(), version.to_lowercase()),
            None => format!("-{}", group_label.to_lowercase()),
        };

        let kind = kind.to_lowercase();
        let mut rendered = self.template.clone();
        for (name, value) in [
            ("NormalizedKubernetesVersion", normalized_version.as_str()),
            ("StrictSuffix", if self.strict { "-strict" } else { "" }),
            ("ResourceKind", kind.as_str()),
            ("KindSuffix", kind_suffix.as_str()),
            ("Group", group.unwrap_or("")),
            ("ResourceAPIVersion", version),
        ] {
            rendered = rendered.replace(&format!("{{{{.{}}}}}", name), value);
        }
        rendered
    }

    #[cfg(feature = "remote")]
    fn fetch_url(&self, url: &str) -> Result<Option<Vec<u8>>, SchemaError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| SchemaError::NetworkError {
                url: url.to_string(),
                source,
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        // Check for HTTP errors before reading the body
        let response = response
            .error_for_status()
            .map_err(|source| SchemaError::NetworkError {
                url: url.to_string(),
                source,
            })?;

        response
            .bytes()
            .map(|body| Some(body.to_vec()))
            .map_err(|source| SchemaError::NetworkError {
                url: url.to_string(),
                source,
            })
    }
}

impl SchemaSource for RegistrySource {
    fn describe(&self) -> String {
        self.template.clone()
    }

    fn fetch(&self, kind: &str, group_version: &str) -> Result<Option<Vec<u8>>, SchemaError> {
        let location = self.location(kind, group_version);
        debug!(%location, "fetching schema");
        if is_url(&location) {
            #[cfg(feature = "remote")]
            {
                self.fetch_url(&location)
            }
            #[cfg(not(feature = "remote"))]
            {
                Ok(None)
            }
        } else {
            read_optional(Path::new(&location))
        }
    }
}

fn validate_template(template: &str) -> Result<(), SchemaError> {
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| SchemaError::InvalidTemplate {
            template: template.to_string(),
            message: "unclosed '{{'".to_string(),
        })?;
        let name = after[..end].trim().trim_start_matches('.');
        if !PLACEHOLDERS.contains(&name) {
            return Err(SchemaError::InvalidTemplate {
                template: template.to_string(),
                message: format!("unknown placeholder '{}'", name),
            });
        }
        rest = &after[end + 2..];
    }
    Ok(())
}

/// Sources used when none are configured explicitly.
#[cfg(feature = "remote")]
pub fn default_registries(
    kubernetes_version: &str,
    strict: bool,
) -> Result<Vec<Box<dyn SchemaSource>>, SchemaError> {
    Ok(vec![
        Box::new(
            RegistrySource::new(NATIVE_REGISTRY)?
                .kubernetes_version(kubernetes_version)
                .strict(strict),
        ),
        Box::new(
            RegistrySource::new(CRDS_REGISTRY)?
                .kubernetes_version(kubernetes_version)
                .strict(strict),
        ),
    ])
}
