#![allow(deprecated)] // TODO: migrate cargo_bin to cargo_bin_cmd!

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const CONFIG: &str = r#"
nestor: "1"
application:
  name: shop
  region: us-west-1
resources:
  s3_bucket: [{ id: upload }]
  dynamodb_table: [{ id: orders }]
  lambda_function:
    - id: worker
      runtime: nodejs20.x
      code: build/worker.zip
      permissions:
        - resource_id: resources.dynamodb_table.orders
          actions: [{ operation: query }]
  apigateway_http:
    - { id: public, target_lambda_id: resources.lambda_function.worker }
triggers:
  s3copy:
    - bucket_id: resources.s3_bucket.upload
      lambdas: [{ lambda_id: resources.lambda_function.worker, prefix: "in/" }]
"#;

fn nestor(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("nestor").unwrap();
    cmd.current_dir(dir)
        .env_remove("NESTOR_CONFIG_PATH")
        .env_remove("NESTOR_ENV")
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir);
    cmd
}

#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    nestor(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("resources"));
}

#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    nestor(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("nestor "));
}

#[test]
fn test_resources_catalog() {
    let dir = tempfile::tempdir().unwrap();
    nestor(dir.path())
        .arg("resources")
        .assert()
        .success()
        .stdout(predicate::str::contains("s3_bucket"))
        .stdout(predicate::str::contains("resources.cognito_user_pool.<id>"))
        .stdout(predicate::str::contains("read, query, write, delete"));
}

#[test]
fn test_validate_prints_order_and_wiring() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("nestor.yml"), CONFIG).unwrap();

    nestor(dir.path())
        .args(["validate", "-e", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shop/prod"))
        .stdout(predicate::str::contains("shop-prod-worker"))
        .stdout(predicate::str::contains("sid-upload-worker"))
        .stdout(predicate::str::contains("sid-public-worker"));
}

#[test]
fn test_validate_with_explicit_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("other.yml");
    fs::write(&config, CONFIG).unwrap();

    nestor(dir.path())
        .arg("validate")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("shop/dev"));
}

#[test]
fn test_validate_reports_bad_reference() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("nestor.yml"),
        CONFIG.replace("resources.dynamodb_table.orders", "resources.dynamodb_table.missing"),
    )
    .unwrap();

    nestor(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("resources.dynamodb_table.missing"));
}

#[test]
fn test_validate_without_config() {
    let dir = tempfile::tempdir().unwrap();
    nestor(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn test_deploy_without_deployments() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("nestor.yml"), CONFIG).unwrap();

    nestor(dir.path())
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no deployments declared"));
}

#[test]
fn test_invalid_command() {
    let dir = tempfile::tempdir().unwrap();
    nestor(dir.path()).arg("destroy").assert().failure();
}
