//! CLI regression tests for the `toscafy` binary.
//!
//! These tests invoke the binary as a subprocess to catch regressions in flag
//! names, exit codes, and output formats.
//!
//! Run with: `cargo test -p toscafy-test`
//! Requires the `toscafy` binary to be built first (`cargo build -p toscafy`).

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;
use toscafy_compiler::ArchiveFormat;

use crate::{archive_entry, archive_names, fixtures};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns an assert_cmd Command wrapping the `toscafy` binary.
fn toscafy() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("toscafy")
        .expect("toscafy binary not found, run `cargo build -p toscafy` first");
    cmd.env_remove("RUST_LOG")
        .env_remove("TOSCAFY_LOG_LEVEL")
        .env_remove("TOSCAFY_GENERATOR");
    cmd
}

fn spec(fixture: &str) -> std::path::PathBuf {
    fixtures().join(fixture)
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn copy_fixture(name: &str, dest: &Path) {
    for entry in fs::read_dir(fixtures().join(name)).unwrap() {
        let entry = entry.unwrap();
        if entry.file_type().unwrap().is_file() {
            fs::copy(entry.path(), dest.join(entry.file_name())).unwrap();
        }
    }
}

// ---------------------------------------------------------------------------
// toscafy validate
// ---------------------------------------------------------------------------

#[test]
fn validate_valid_spec_exits_zero() {
    toscafy()
        .args(["validate", "--spec"])
        .arg(spec("scenario-a/csarspec.json"))
        .assert()
        .success()
        .stderr(contains("is valid"));
}

#[test]
fn validate_parse_error_exits_one() {
    toscafy()
        .args(["validate", "--spec"])
        .arg(spec("invalid-parse/csarspec.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E1002"));
}

#[test]
fn validate_dangling_artifact_exits_one() {
    toscafy()
        .args(["validate", "--spec"])
        .arg(spec("invalid-dangling/csarspec.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E1012"))
        .stderr(contains("missing_script"));
}

#[test]
fn validate_missing_file_exits_one() {
    toscafy()
        .args(["validate", "--spec", "this-file-does-not-exist.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("spec file not found"));
}

#[test]
fn validate_reserved_manifest_exits_one() {
    toscafy()
        .args(["validate", "--spec"])
        .arg(spec("reserved/csarspec.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E1017"));
}

#[test]
fn validate_json_prints_normalized_spec() {
    let output = toscafy()
        .args(["validate", "--format", "json", "--spec"])
        .arg(spec("scenario-a/csarspec.json"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let spec = stdout_json(&output);
    assert_eq!(spec["csar_namespace"], "http://toscafy.github.io/generated/demo");
    assert_eq!(spec["topologies"]["main"]["nodes"]["web1"]["properties"]["port"], "8080");
    assert_eq!(spec["artifacts"]["install_script"]["type"], "ScriptArtifact");
}

#[test]
fn validate_camelize_renames_identifiers() {
    let output = toscafy()
        .args(["validate", "--camelize", "--format", "json", "--spec"])
        .arg(spec("scenario-a/csarspec.json"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let spec = stdout_json(&output);
    assert!(spec["artifacts"]["InstallScript"].is_object());
    assert!(spec["artifacts"]["install_script"].is_null());
    assert_eq!(
        spec["node_types"]["Web"]["operations"]["install"],
        serde_json::json!(["InstallScript"])
    );
    assert_eq!(spec["topologies"]["Main"]["nodes"]["Web1"]["type"], "Web");
}

#[test]
fn validate_applies_template_variables() {
    let output = toscafy()
        .args(["validate", "--format", "json", "--var", "name=templated", "--var", "port=9090"])
        .arg("--spec")
        .arg(spec("templated/csarspec.yml"))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let spec = stdout_json(&output);
    assert_eq!(spec["csar_name"], "templated");
    assert_eq!(
        spec["topologies"]["templated_Topology"]["nodes"]["web1"]["properties"]["port"],
        "9090"
    );
}

#[test]
fn validate_unresolved_variable_exits_one() {
    toscafy()
        .args(["validate", "--var", "name=only-name", "--spec"])
        .arg(spec("templated/csarspec.yml"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E1003"))
        .stderr(contains("port"));
}

#[test]
fn validate_malformed_var_exits_one() {
    toscafy()
        .args(["validate", "--var", "no-equals-sign", "--spec"])
        .arg(spec("scenario-a/csarspec.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("expected key=value"));
}

// ---------------------------------------------------------------------------
// toscafy generate
// ---------------------------------------------------------------------------

#[test]
fn generate_writes_csar_tree() {
    let out = TempDir::new().unwrap();
    let target = out.path().join("csar");

    toscafy()
        .args(["generate", "--spec"])
        .arg(spec("scenario-a/csarspec.json"))
        .arg("--output")
        .arg(&target)
        .assert()
        .success()
        .stderr(contains("generated CSAR 'demo'"));

    assert!(target.join("install.sh").is_file());
    assert!(target.join("Definitions/csarspec.json").is_file());
    assert!(target.join("Schemas/properties.xsd").is_file());

    let definitions = fs::read_to_string(target.join("Definitions/definitions.xml")).unwrap();
    assert!(definitions.contains("http://www.example.com/interfaces/lifecycle"));
    assert!(definitions.contains("<port>8080</port>"));

    let meta = fs::read_to_string(target.join("TOSCA-Metadata/TOSCA.meta")).unwrap();
    assert!(meta.starts_with("TOSCA-Meta-File-Version: 1.0\n"));
    assert!(meta.contains("Entry-Definitions: Definitions/definitions.xml"));
}

#[test]
fn generate_json_reports_checksums() {
    let out = TempDir::new().unwrap();
    let output = toscafy()
        .args(["generate", "--format", "json", "--spec"])
        .arg(spec("scenario-a/csarspec.json"))
        .arg("--output")
        .arg(out.path().join("csar"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["csar_name"], "demo");
    assert_eq!(result["definitions_file"], "Definitions/definitions.xml");
    assert!(result["checksums"]["TOSCA-Metadata/TOSCA.meta"]
        .as_str()
        .unwrap()
        .starts_with("sha256:"));
}

#[test]
fn generate_output_inside_working_dir_exits_one() {
    let work = TempDir::new().unwrap();
    copy_fixture("scenario-a", work.path());
    let nested = work.path().join("out");

    toscafy()
        .args(["generate", "--spec"])
        .arg(work.path().join("csarspec.json"))
        .arg("--output")
        .arg(&nested)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E1001"));
    assert!(!nested.exists());
}

// ---------------------------------------------------------------------------
// toscafy package
// ---------------------------------------------------------------------------

#[test]
fn package_zip_and_tgz_by_extension() {
    for (file, format) in [("demo.zip", ArchiveFormat::Zip), ("demo.tar.gz", ArchiveFormat::TarGz)] {
        let out = TempDir::new().unwrap();
        let archive = out.path().join(file);

        toscafy()
            .args(["package", "--spec"])
            .arg(spec("scenario-a/csarspec.json"))
            .arg("--output")
            .arg(&archive)
            .assert()
            .success()
            .stderr(contains("packaged CSAR 'demo'"));

        let names = archive_names(&archive, format).unwrap();
        for expected in [
            "Definitions/definitions.xml",
            "Schemas/properties.xsd",
            "TOSCA-Metadata/TOSCA.meta",
            "install.sh",
        ] {
            assert!(names.iter().any(|n| n == expected), "{} missing from {}", expected, file);
        }
        let script = archive_entry(&archive, format, "install.sh").unwrap().unwrap();
        assert_eq!(script, fs::read(spec("scenario-a/install.sh")).unwrap());
    }
}

#[test]
fn package_to_stdout() {
    let output = toscafy()
        .args(["package", "--archive-format", "tar", "--output", "-", "--spec"])
        .arg(spec("scenario-a/csarspec.json"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("stdout.tar");
    fs::write(&archive, &output.stdout).unwrap();
    let names = archive_names(&archive, ArchiveFormat::Tar).unwrap();
    assert!(names.iter().any(|n| n == "TOSCA-Metadata/TOSCA.meta"));
}

#[test]
fn package_invalid_format_exits_one() {
    let out = TempDir::new().unwrap();
    toscafy()
        .args(["package", "--archive-format", "rar", "--spec"])
        .arg(spec("scenario-a/csarspec.json"))
        .arg("--output")
        .arg(out.path().join("demo.rar"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E1004"));
}

#[test]
fn package_failure_leaves_no_archive() {
    let out = TempDir::new().unwrap();
    let archive = out.path().join("broken.zip");
    toscafy()
        .args(["package", "--spec"])
        .arg(spec("invalid-dangling/csarspec.json"))
        .arg("--output")
        .arg(&archive)
        .assert()
        .failure()
        .code(1);
    assert!(!archive.exists());
}
