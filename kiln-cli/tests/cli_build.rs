use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn kiln(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(dir);
    cmd
}

#[test]
fn init_then_build_writes_linked_pages() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    kiln(dir.path()).arg("init").assert().success();

    kiln(dir.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiled 2 of 2 reps"));

    let index = fs::read_to_string(dir.path().join("output/index.html"))?;
    assert!(index.contains("<title>Welcome | My kiln site</title>"));
    assert!(index.contains("<h1>Welcome</h1>"));
    assert!(index.contains(r#"<a href="/about.html">About</a>"#));
    assert!(dir.path().join("output/about.html").exists());
    Ok(())
}

#[test]
fn second_build_uses_cache() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    kiln(dir.path()).arg("init").assert().success();
    kiln(dir.path()).arg("build").assert().success();

    kiln(dir.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiled 0 of 2 reps (2 from cache)"));
    Ok(())
}

#[test]
fn check_reports_outdated_reps() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    kiln(dir.path()).arg("init").assert().success();
    kiln(dir.path()).arg("build").assert().success();

    kiln(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("All 2 reps are up to date"));

    fs::write(
        dir.path().join("content/about.md"),
        "---\ntitle: About\n---\n\nRewritten.\n",
    )?;

    let assert = kiln(dir.path()).args(["check", "--json"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let value: Value = serde_json::from_str(&stdout)?;
    let entries = value.as_array().expect("json array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["item"], "/about.md");
    assert_eq!(entries[0]["rep"], "default");
    assert!(entries[0]["reasons"]
        .as_array()
        .expect("reasons array")
        .contains(&Value::String("content modified".to_string())));
    Ok(())
}

#[test]
fn build_fails_on_unknown_filter() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    kiln(dir.path()).arg("init").assert().success();
    fs::write(
        dir.path().join("rules.yml"),
        "compile:\n  - regex: \".*\"\n    steps:\n      - filter: nope\n    path: \"{identifier}\"\n",
    )?;

    kiln(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("rep(s) failed to compile"));
    Ok(())
}

#[test]
fn build_without_config_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    kiln(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
    Ok(())
}
