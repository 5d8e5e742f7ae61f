//! CLI integration tests for krm-envsubst binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("krm-envsubst"))
}

const POD_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "spec": {
            "type": "object",
            "properties": {
                "hostname": { "type": "string" },
                "containers": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "ports": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "containerPort": { "type": "integer" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}"#;

const POD: &str = "\
apiVersion: v1
kind: Pod
metadata:
  name: web
spec:
  hostname: ${HOST}
  containers:
  - name: c
    ports:
    - containerPort: \"${PORT}\"
";

// Helper to create a temp file, including parent directories
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Bundle directory holding the Pod schema.
fn pod_bundle() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_temp_file(&dir, "native/master-standalone/pod-v1.json", POD_SCHEMA);
    dir
}

fn offline(bundle: &Path) -> Command {
    let mut cmd = cmd();
    cmd.args(["--offline", "--schema-dir", bundle.to_str().unwrap()]);
    cmd
}

mod substitution {
    use super::*;

    #[test]
    fn environment_values_keep_field_types() {
        let bundle = pod_bundle();
        offline(bundle.path())
            .env("PORT", "8080")
            .env("HOST", "1234")
            .write_stdin(POD)
            .assert()
            .success()
            .stdout(predicate::str::contains("containerPort: 8080\n"))
            .stdout(predicate::str::contains("hostname: '1234'\n"));
    }

    #[test]
    fn set_overrides_environment() {
        let bundle = pod_bundle();
        offline(bundle.path())
            .env("PORT", "8080")
            .args(["--set", "PORT=9090", "--set", "HOST=web"])
            .write_stdin(POD)
            .assert()
            .success()
            .stdout(predicate::str::contains("containerPort: 9090\n"))
            .stdout(predicate::str::contains("hostname: web\n"));
    }

    #[test]
    fn without_schema_values_follow_literal_form() {
        cmd()
            .args(["--offline", "--set", "N=5"])
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  n: ${N}\n")
            .assert()
            .success()
            .stdout("apiVersion: v1\nkind: ConfigMap\ndata:\n  n: 5\n");
    }

    #[test]
    fn multiple_documents() {
        let bundle = pod_bundle();
        offline(bundle.path())
            .args(["--set", "PORT=80", "--set", "HOST=a"])
            .write_stdin(format!("{}---\n{}", POD, POD))
            .assert()
            .success()
            .stdout(predicate::str::contains("---\n"))
            .stdout(predicate::str::contains("containerPort: 80\n").count(2));
    }

    #[test]
    fn include_limits_substitution() {
        cmd()
            .args(["--offline", "--include", "A", "--set", "A=1", "--set", "B=2"])
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  a: x${A}\n  b: x${B}\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("a: x1\n"))
            .stdout(predicate::str::contains("b: x${B}\n"));
    }

    #[test]
    fn exclude_leaves_variable_literal() {
        cmd()
            .args(["--offline", "--exclude", "HOME"])
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  home: x${HOME}\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("home: x${HOME}\n"));
    }

    #[test]
    fn resource_list_round_trip() {
        let input = "\
apiVersion: config.kubernetes.io/v1
kind: ResourceList
items:
- apiVersion: v1
  kind: ConfigMap
  data:
    greeting: hello ${WHO}
functionConfig:
  apiVersion: example.com/v1
  kind: Envsubst
  values:
    WHO: world
";
        cmd()
            .arg("--offline")
            .write_stdin(input)
            .assert()
            .success()
            .stdout(predicate::str::contains("kind: ResourceList\n"))
            .stdout(predicate::str::contains("greeting: hello world\n"))
            .stdout(predicate::str::contains("functionConfig:\n"));
    }
}

mod config_file {
    use super::*;

    #[test]
    fn values_from_config_file() {
        let dir = TempDir::new().unwrap();
        let config = write_temp_file(
            &dir,
            "envsubst.yaml",
            "apiVersion: example.com/v1\nkind: Envsubst\nvalues:\n  N: 7\n",
        );
        cmd()
            .arg(config.to_str().unwrap())
            .arg("--offline")
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  n: ${N}\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("n: 7\n"));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let config = write_temp_file(&dir, "envsubst.yaml", "values:\n  N: 7\n");
        cmd()
            .arg(config.to_str().unwrap())
            .args(["--offline", "--set", "N=8"])
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  n: ${N}\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("n: 8\n"));
    }

    #[test]
    fn allow_empty_from_config_file() {
        let dir = TempDir::new().unwrap();
        let config = write_temp_file(&dir, "envsubst.yaml", "allowEmpty: true\n");
        cmd()
            .arg(config.to_str().unwrap())
            .arg("--offline")
            .env_remove("KRM_ENVSUBST_CLI_UNSET")
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  n: ${KRM_ENVSUBST_CLI_UNSET}\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("n: ''\n"));
    }

    #[test]
    fn unreadable_config_file_is_ignored() {
        cmd()
            .args(["/nonexistent/envsubst.yaml", "--offline", "--set", "N=1"])
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  n: ${N}\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("n: 1\n"));
    }

    #[test]
    fn malformed_config_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = write_temp_file(&dir, "envsubst.yaml", "allowEmpty: [1]\n");
        cmd()
            .arg(config.to_str().unwrap())
            .arg("--offline")
            .write_stdin("apiVersion: v1\nkind: ConfigMap\n")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("invalid config"));
    }
}

mod error_handling {
    use super::*;

    #[test]
    fn missing_variable_exits_1() {
        cmd()
            .arg("--offline")
            .env_remove("KRM_ENVSUBST_CLI_MISSING")
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  n: ${KRM_ENVSUBST_CLI_MISSING}\n")
            .assert()
            .code(1)
            .stderr(predicate::str::starts_with("krm-envsubst: "))
            .stderr(predicate::str::contains(
                "value `${KRM_ENVSUBST_CLI_MISSING}` evaluated to empty string",
            ))
            .stderr(predicate::str::contains("v1.ConfigMap.data.n"));
    }

    #[test]
    fn allow_empty_flag() {
        cmd()
            .args(["--offline", "--allow-empty"])
            .env_remove("KRM_ENVSUBST_CLI_MISSING")
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  n: ${KRM_ENVSUBST_CLI_MISSING}\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("n: ''\n"));
    }

    #[test]
    fn structured_value_exits_1() {
        cmd()
            .args(["--offline", "--set", "V=a: b"])
            .write_stdin("apiVersion: v1\nkind: ConfigMap\ndata:\n  n: ${V}\n")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("did not evaluate to a scalar"));
    }

    #[test]
    fn invalid_yaml_exits_2() {
        cmd()
            .arg("--offline")
            .write_stdin("a: [1, 2\n")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("invalid YAML input"));
    }

    #[test]
    fn corrupt_schema_exits_2() {
        let dir = TempDir::new().unwrap();
        write_temp_file(&dir, "native/master-standalone/pod-v1.json", "{ not json");
        offline(dir.path())
            .args(["--set", "HOST=h", "--set", "PORT=1"])
            .write_stdin(POD)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("could not parse schema for Pod v1"));
    }

    #[test]
    fn unknown_template_placeholder_exits_2() {
        cmd()
            .args(["--offline", "--schema-location", "/schemas/{{.Nope}}.json"])
            .write_stdin("apiVersion: v1\nkind: ConfigMap\n")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("unknown placeholder 'Nope'"));
    }

    #[test]
    fn malformed_set_is_rejected() {
        cmd()
            .args(["--offline", "--set", "NOVALUE"])
            .write_stdin("")
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected NAME=VALUE"));
    }
}

mod schema_locations {
    use super::*;

    #[test]
    fn file_template() {
        let dir = TempDir::new().unwrap();
        write_temp_file(&dir, "pod-v1.json", POD_SCHEMA);
        let template = format!("{}/{{{{.ResourceKind}}}}{{{{.KindSuffix}}}}.json", dir.path().display());

        cmd()
            .args(["--offline", "--schema-location", &template])
            .args(["--set", "PORT=8080", "--set", "HOST=1"])
            .write_stdin(POD)
            .assert()
            .success()
            .stdout(predicate::str::contains("containerPort: 8080\n"))
            .stdout(predicate::str::contains("hostname: '1'\n"));
    }

    #[test]
    fn schema_dir_wins_over_location() {
        let bundle = pod_bundle();
        let other = TempDir::new().unwrap();
        write_temp_file(
            &other,
            "pod-v1.json",
            r#"{"properties": {"spec": {"properties": {"hostname": {"type": "integer"}}}}}"#,
        );
        let template = format!("{}/{{{{.ResourceKind}}}}{{{{.KindSuffix}}}}.json", other.path().display());

        offline(bundle.path())
            .args(["--schema-location", &template])
            .args(["--set", "PORT=1", "--set", "HOST=22"])
            .write_stdin(POD)
            .assert()
            .success()
            .stdout(predicate::str::contains("hostname: '22'\n"));
    }
}

#[cfg(feature = "remote")]
mod remote {
    use super::*;

    #[test]
    fn schema_from_registry() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/master-standalone/pod-v1.json")
            .with_status(200)
            .with_body(POD_SCHEMA)
            .expect(1)
            .create();
        let template = format!(
            "{}/{{{{.NormalizedKubernetesVersion}}}}-standalone{{{{.StrictSuffix}}}}/{{{{.ResourceKind}}}}{{{{.KindSuffix}}}}.json",
            server.url()
        );

        cmd()
            .args(["--offline", "--schema-location", &template])
            .args(["--set", "PORT=8080", "--set", "HOST=1234"])
            .write_stdin(format!("{}---\n{}", POD, POD))
            .assert()
            .success()
            .stdout(predicate::str::contains("containerPort: 8080\n"))
            .stdout(predicate::str::contains("hostname: '1234'\n"));

        // Both documents share one fetch.
        mock.assert();
    }

    #[test]
    fn strict_and_versioned_location() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v1.29.0-standalone-strict/pod-v1.json")
            .with_status(200)
            .with_body(POD_SCHEMA)
            .create();
        let template = format!(
            "{}/{{{{.NormalizedKubernetesVersion}}}}-standalone{{{{.StrictSuffix}}}}/{{{{.ResourceKind}}}}{{{{.KindSuffix}}}}.json",
            server.url()
        );

        cmd()
            .args(["--offline", "--schema-location", &template])
            .args(["--kubernetes-version", "1.29.0", "--strict-schemas"])
            .args(["--set", "PORT=8080", "--set", "HOST=h"])
            .write_stdin(POD)
            .assert()
            .success()
            .stdout(predicate::str::contains("containerPort: 8080\n"));
        mock.assert();
    }

    #[test]
    fn missing_schema_degrades_to_literal_form() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/pod.json").with_status(404).create();
        let template = format!("{}/{{{{.ResourceKind}}}}.json", server.url());

        cmd()
            .args(["--offline", "--schema-location", &template])
            .args(["--set", "PORT=8080", "--set", "HOST=1234"])
            .write_stdin(POD)
            .assert()
            .success()
            .stdout(predicate::str::contains("hostname: 1234\n"));
        mock.assert();
    }

    #[test]
    fn server_error_exits_3() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/pod.json").with_status(500).create();
        let template = format!("{}/{{{{.ResourceKind}}}}.json", server.url());

        cmd()
            .args(["--offline", "--schema-location", &template])
            .args(["--set", "PORT=8080", "--set", "HOST=1234"])
            .write_stdin(POD)
            .assert()
            .code(3)
            .stderr(predicate::str::contains("failed to fetch"));
    }
}

mod help_and_version {
    use super::*;

    #[test]
    fn help_flag() {
        cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("keeping field types"))
            .stdout(predicate::str::contains("--schema-dir"))
            .stdout(predicate::str::contains("--allow-empty"));
    }

    #[test]
    fn version_flag() {
        cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("krm-envsubst"));
    }
}
