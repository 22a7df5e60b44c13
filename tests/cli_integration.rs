//! Integration tests for the Sealbox CLI.
//!
//! These tests exercise the binary end-to-end using `assert_cmd`.
//! Passwords come from `SEALBOX_PASSWORD` and keys are cached in memory,
//! so no prompts or OS keyring are involved.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PASSWORD: &str = "correct-horse";

/// Helper: get a Command pointing at the sealbox binary.
fn sealbox() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("sealbox").expect("binary should exist")
}

/// A temp project with a cheap KDF setting.
fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".sealbox.toml"),
        "kdf_iterations = 1000\nkey_cache = \"memory\"\n",
    )
    .unwrap();
    tmp
}

/// A command in `dir` with the password and in-memory key cache set.
fn cmd(dir: &TempDir) -> Command {
    let mut cmd = sealbox();
    cmd.current_dir(dir.path())
        .env("SEALBOX_PASSWORD", PASSWORD)
        .env_remove("SEALBOX_LOG")
        .args(["--key-cache", "memory"]);
    cmd
}

fn init(dir: &TempDir) {
    cmd(dir).arg("init").assert().success();
}

#[test]
fn help_flag_shows_usage() {
    sealbox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Encrypted single-file secrets store"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("collections"))
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("passwd"));
}

#[test]
fn version_flag_shows_version() {
    sealbox()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sealbox"));
}

#[test]
fn no_args_shows_help() {
    sealbox()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn init_creates_store_file() {
    let tmp = project();
    cmd(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Store created"));

    let bytes = fs::read(tmp.path().join(".sealbox/secrets.store")).unwrap();
    assert_eq!(&bytes[..9], b"SEALBOX01");
}

#[test]
fn init_twice_fails() {
    let tmp = project();
    init(&tmp);
    cmd(&tmp)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn init_rejects_short_password() {
    let tmp = project();
    cmd(&tmp)
        .env("SEALBOX_PASSWORD", "short")
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 8"));
}

#[test]
fn commands_need_a_store() {
    let tmp = project();
    cmd(&tmp)
        .arg("collections")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no store"));
}

#[test]
fn add_then_get_round_trips() {
    let tmp = project();
    init(&tmp);
    cmd(&tmp)
        .args(["collection", "create", "work"])
        .assert()
        .success();
    cmd(&tmp)
        .args(["add", "work", "wifi", "secret123", "--attr", "ssid=x"])
        .assert()
        .success();

    cmd(&tmp)
        .args(["get", "work", "wifi"])
        .assert()
        .success()
        .stdout("secret123\n");

    cmd(&tmp)
        .arg("collections")
        .assert()
        .success()
        .stdout(predicate::str::contains("work"));
}

#[test]
fn search_lists_metadata_without_values() {
    let tmp = project();
    init(&tmp);
    cmd(&tmp)
        .args(["collection", "create", "work"])
        .assert()
        .success();
    cmd(&tmp)
        .args(["add", "work", "wifi", "secret123", "-a", "ssid=x"])
        .assert()
        .success();

    cmd(&tmp)
        .args(["search", "work", "--attr", "ssid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wifi"))
        .stdout(predicate::str::contains("ssid=x"))
        .stdout(predicate::str::contains("secret123").not());
}

#[test]
fn wrong_password_is_rejected() {
    let tmp = project();
    init(&tmp);
    cmd(&tmp)
        .env("SEALBOX_PASSWORD", "not-the-password")
        .arg("collections")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Integrity check failed"));
}

#[test]
fn duplicate_add_needs_replace() {
    let tmp = project();
    init(&tmp);
    cmd(&tmp)
        .args(["collection", "create", "work"])
        .assert()
        .success();
    cmd(&tmp).args(["add", "work", "k", "one"]).assert().success();
    cmd(&tmp)
        .args(["add", "work", "k", "two"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    cmd(&tmp)
        .args(["add", "work", "k", "two", "--replace"])
        .assert()
        .success();
    cmd(&tmp)
        .args(["get", "work", "k"])
        .assert()
        .success()
        .stdout("two\n");
}

#[test]
fn remove_and_delete_collection() {
    let tmp = project();
    init(&tmp);
    cmd(&tmp)
        .args(["collection", "create", "work"])
        .assert()
        .success();
    cmd(&tmp).args(["add", "work", "k", "v"]).assert().success();

    cmd(&tmp)
        .args(["remove", "work", "k", "--force"])
        .assert()
        .success();
    cmd(&tmp)
        .args(["get", "work", "k"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Item not found"));

    cmd(&tmp)
        .args(["collection", "delete", "work", "--force"])
        .assert()
        .success();
    cmd(&tmp)
        .arg("collections")
        .assert()
        .success()
        .stdout(predicate::str::contains("No collections"));
}

#[test]
fn passwd_switches_password() {
    let tmp = project();
    init(&tmp);
    cmd(&tmp)
        .env("SEALBOX_NEW_PASSWORD", "battery-staple")
        .arg("passwd")
        .assert()
        .success();

    cmd(&tmp).arg("collections").assert().failure();
    cmd(&tmp)
        .env("SEALBOX_PASSWORD", "battery-staple")
        .arg("collections")
        .assert()
        .success();
}

#[test]
fn custom_store_path_is_respected() {
    let tmp = project();
    cmd(&tmp)
        .args(["--store", "elsewhere/my.store", "init"])
        .assert()
        .success();
    assert!(tmp.path().join("elsewhere/my.store").exists());
}

#[test]
fn completions_bash_works() {
    sealbox()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sealbox"));
}

#[test]
fn completions_unknown_shell_fails() {
    sealbox().args(["completions", "csh"]).assert().failure();
}
