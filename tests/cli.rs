use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("crowdwork")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("schema"));
}

#[test]
fn schema_prints_config_schema() {
    Command::cargo_bin("crowdwork")
        .unwrap()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("Config"))
        .stdout(predicate::str::contains("perspectives"));
}

#[test]
fn init_writes_and_refuses_overwrite() {
    let path = std::env::temp_dir().join(format!("crowdwork-init-{}.yaml", std::process::id()));
    let _ = std::fs::remove_file(&path);

    Command::cargo_bin("crowdwork")
        .unwrap()
        .args(["init", "--config"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    Command::cargo_bin("crowdwork")
        .unwrap()
        .args(["init", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let _ = std::fs::remove_file(&path);
}
