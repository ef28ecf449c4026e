use std::collections::BTreeMap;

use assert_cmd::Command;
use predicates::prelude::*;
use tokenward_core::auth::AccessTokenIssuer;
use tokenward_core::config::AuthConfig;
use tokenward_core::models::auth::Principal;

const KEY: &str = "cli-test-key-0123456789abcdef0123456789";

fn tokenward() -> Command {
    let mut cmd = Command::cargo_bin("tokenward").unwrap();
    cmd.env_remove("JWT_KEY").env_remove("JWT_SECRET");
    cmd
}

fn token() -> String {
    let issuer = AccessTokenIssuer::new(&AuthConfig::new(KEY.as_bytes().to_vec())).unwrap();
    issuer
        .issue(
            &Principal::new("ab", "a@x.com"),
            &["User".to_string()],
            &BTreeMap::new(),
        )
        .unwrap()
}

#[test]
fn version_prints_package_version() {
    tokenward()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn keygen_prints_a_base64_key() {
    tokenward()
        .arg("keygen")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[A-Za-z0-9+/]{64}\n$").unwrap());
}

#[test]
fn keygen_rejects_too_few_bytes() {
    tokenward()
        .args(["keygen", "--bytes", "8"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--bytes must be at least"));
}

#[test]
fn inspect_prints_verified_claims() {
    tokenward()
        .env("JWT_KEY", KEY)
        .args(["inspect", &token()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sub\": \"ab\""))
        .stdout(predicate::str::contains("\"email\": \"a@x.com\""));
}

#[test]
fn inspect_rejects_token_signed_with_another_key() {
    tokenward()
        .env("JWT_KEY", "another-key-0123456789abcdef0123456789")
        .args(["inspect", &token()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("token is invalid or expired"));
}

#[test]
fn inspect_without_key_is_a_configuration_error() {
    tokenward()
        .args(["inspect", &token()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
