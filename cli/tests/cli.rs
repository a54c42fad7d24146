//! CLI round trips against an isolated data directory.

use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value as JsonValue;
use tempfile::TempDir;

/// `servicedesk` with a config pointing at `dir/data`.
fn servicedesk(dir: &Path) -> Result<Command> {
    let config = dir.join("servicedesk.toml");
    let data_dir = dir.join("data");
    std::fs::write(
        &config,
        format!("data_dir = '{}'\n", data_dir.to_string_lossy()),
    )?;
    let mut cmd = Command::cargo_bin("servicedesk")?;
    cmd.env("SERVICEDESK_CONFIG", &config);
    cmd.env("RUST_LOG", "error");
    Ok(cmd)
}

fn intake(dir: &Path) -> Result<String> {
    let output = servicedesk(dir)?
        .args([
            "intake",
            "--name",
            "Asha Rao",
            "--phone",
            "9820012345",
            "--model",
            "Maruti Swift",
            "--reg",
            "mh12ab1234",
        ])
        .output()?;
    assert!(output.status.success());
    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

#[test]
fn intake_then_board_and_show() -> Result<()> {
    let tmp = TempDir::new()?;
    let id = intake(tmp.path())?;

    servicedesk(tmp.path())?
        .arg("board")
        .assert()
        .success()
        .stdout(predicate::str::contains("MH12AB1234"))
        .stdout(predicate::str::contains("== New Intake (1) =="));

    servicedesk(tmp.path())?
        .args(["note", &id[..8], "Customer wants pickup by Friday"])
        .assert()
        .success();

    let output = servicedesk(tmp.path())?
        .args(["show", &id, "--json"])
        .output()?;
    assert!(output.status.success());
    let case: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(case["registrationNumber"], "MH12AB1234");
    assert_eq!(case["stage"], "new-intake");
    assert_eq!(case["notes"][0]["text"], "Customer wants pickup by Friday");
    Ok(())
}

#[test]
fn stage_changes_show_up_in_stats() -> Result<()> {
    let tmp = TempDir::new()?;
    let id = intake(tmp.path())?;

    servicedesk(tmp.path())?
        .args(["move", &id, "ready-for-delivery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ready for Delivery"));

    let output = servicedesk(tmp.path())?.args(["stats", "--json"]).output()?;
    let stats: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["ready_for_delivery"], 1);
    assert_eq!(stats["active"], 1);
    Ok(())
}

#[test]
fn bad_input_is_rejected() -> Result<()> {
    let tmp = TempDir::new()?;
    let id = intake(tmp.path())?;

    servicedesk(tmp.path())?
        .args(["move", &id, "archived"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown stage"));

    servicedesk(tmp.path())?
        .args(["update", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to update"));

    servicedesk(tmp.path())?
        .args(["delete", "no-such-case"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no case matches"));

    servicedesk(tmp.path())?
        .args(["intake", "--name", "X", "--phone", " ", "--model", "Y", "--reg", "Z"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("customer_phone is required"));
    Ok(())
}
