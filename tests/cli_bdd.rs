//! BDD tests: the `app-controller` binary.
//!
//! **Scenario:** GIVEN a manifest on disk WHEN the binary is invoked
//! THEN it renders dependents or fails with a clear message.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::io::Write;
use std::process::{Command, Output};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const MANIFEST: &str = r"
apiVersion: appcontroller.k8s.io/v1alpha1
kind: App
metadata:
  name: shop
  namespace: default
spec:
  deployment:
    name: shop-web
    image: x
    replicas: 3
  service:
    name: shop-svc
  ingress:
    name: shop-ing
";

fn app_controller(args: &[&str]) -> std::io::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_app-controller"))
        .args(args)
        .env("RUST_LOG", "error")
        .output()
}

fn manifest_file(contents: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn given_app_manifest_when_rendered_as_json_then_enabled_dependents_are_printed() -> TestResult {
    // Given: an App with the default service and no ingress
    let manifest = manifest_file(MANIFEST)?;
    let path = manifest.path().to_string_lossy().to_string();

    // When: rendering as JSON
    let output = app_controller(&["render", "--manifest", &path, "--output", "json"])?;

    // Then: a Deployment and a Service, both owned by the App
    assert!(output.status.success());
    let values: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout)?;
    let kinds: Vec<_> = values
        .iter()
        .filter_map(|v| v.get("kind").and_then(serde_json::Value::as_str))
        .collect();
    assert_eq!(kinds, vec!["Deployment", "Service"]);
    for value in &values {
        let owner_kind = value
            .pointer("/metadata/ownerReferences/0/kind")
            .and_then(serde_json::Value::as_str);
        assert_eq!(owner_kind, Some("App"));
    }
    Ok(())
}

#[test]
fn given_app_manifest_when_rendered_as_yaml_then_documents_are_separated() -> TestResult {
    // Given: an App manifest
    let manifest = manifest_file(MANIFEST)?;
    let path = manifest.path().to_string_lossy().to_string();

    // When: rendering with the default format
    let output = app_controller(&["render", "--manifest", &path])?;

    // Then: two YAML documents
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("kind: Deployment"));
    assert!(stdout.contains("kind: Service"));
    assert_eq!(stdout.matches("\n---\n").count(), 1);
    Ok(())
}

#[test]
fn given_missing_manifest_when_run_then_exits_with_error() -> TestResult {
    // Given: a path that does not exist
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent.yaml").to_string_lossy().to_string();

    // When: running the controller
    let output = app_controller(&["run", "--manifests", &path])?;

    // Then: it fails before starting and says why
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Failed to read manifest"));
    Ok(())
}

#[test]
fn given_zero_workers_when_run_then_config_is_rejected() -> TestResult {
    // Given: a valid manifest
    let manifest = manifest_file(MANIFEST)?;
    let path = manifest.path().to_string_lossy().to_string();

    // When: asking for zero workers
    let output = app_controller(&["run", "--manifests", &path, "--workers", "0"])?;

    // Then: configuration validation stops the run
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Invalid controller configuration"));
    Ok(())
}

#[test]
fn given_unknown_kind_when_rendered_then_decoding_fails() -> TestResult {
    // Given: a manifest with a kind the scheme does not know
    let manifest = manifest_file("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: c\n")?;
    let path = manifest.path().to_string_lossy().to_string();

    // When: rendering it
    let output = app_controller(&["render", "--manifest", &path])?;

    // Then: the binary exits non-zero
    assert!(!output.status.success());
    Ok(())
}
