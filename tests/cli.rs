use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::tempdir;

fn ironward(data_dir: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("ironward")?;
    cmd.env("IRONWARD_DATA_DIR", data_dir)
        .env("IRONWARD_BACKUP_FAKE_FREE_BYTES", "10000000000")
        .env("IRONWARD_LOG", "off");
    Ok(cmd)
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn db_status_reports_ok_on_a_fresh_store() -> Result<()> {
    let tmp = tempdir()?;

    let output = ironward(tmp.path())?.args(["db", "status"]).output()?;
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        stdout_of(&output),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Status       : ok"));
    assert!(stdout.contains("Checks:"));

    let output = ironward(tmp.path())?
        .args(["db", "status", "--json"])
        .output()?;
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["status"], "ok");
    assert_eq!(report["collections"].as_array().map(Vec::len), Some(13));
    Ok(())
}

#[test]
fn console_set_then_show_and_audit_tail() -> Result<()> {
    let tmp = tempdir()?;
    let input = tmp.path().join("wards.json");
    std::fs::write(&input, r#"[{"id": "w-1", "name": "North", "capacity": 4}]"#)?;

    let output = ironward(tmp.path())?
        .args(["console", "set", "wards"])
        .arg(&input)
        .args(["--passphrase", "dev123"])
        .output()?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout_of(&output).contains("Replaced wards with 1 records."));

    let output = ironward(tmp.path())?
        .args(["console", "show", "wards", "--passphrase", "dev123"])
        .output()?;
    assert!(output.status.success());
    let shown: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(shown[0]["name"], "North");

    let output = ironward(tmp.path())?
        .args(["console", "show", "wards", "--passphrase", "wrong"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));

    let output = ironward(tmp.path())?
        .args(["audit", "tail", "-n", "5"])
        .output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("Raw override: wards"));
    Ok(())
}

#[test]
fn backup_then_restore_requires_confirmation() -> Result<()> {
    let tmp = tempdir()?;
    let input = tmp.path().join("inmates.json");
    std::fs::write(&input, r#"[{"id": "i-1", "fullName": "Sample Person"}]"#)?;
    ironward(tmp.path())?
        .args(["console", "set", "inmates"])
        .arg(&input)
        .args(["--passphrase", "dev123"])
        .assert()
        .success();

    let output = ironward(tmp.path())?
        .args(["backup", "create", "--json"])
        .output()?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let entry: Value = serde_json::from_slice(&output.stdout)?;
    let backup_path = entry["path"].as_str().expect("path").to_string();
    assert!(Path::new(&backup_path).exists());

    let output = ironward(tmp.path())?.args(["backup", "list"]).output()?;
    assert!(stdout_of(&output).contains(entry["fileName"].as_str().expect("fileName")));

    ironward(tmp.path())?.args(["reset", "--yes"]).assert().success();
    let output = ironward(tmp.path())?
        .args(["console", "show", "inmates", "--passphrase", "dev123"])
        .output()?;
    let shown: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(shown, Value::Array(Vec::new()));

    let output = ironward(tmp.path())?
        .args(["restore", backup_path.as_str()])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout_of(&output).contains("Snapshot version : 1.0.0"));

    ironward(tmp.path())?
        .args(["restore", backup_path.as_str(), "--yes"])
        .assert()
        .success();
    let output = ironward(tmp.path())?
        .args(["console", "show", "inmates", "--passphrase", "dev123"])
        .output()?;
    let shown: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(shown[0]["fullName"], "Sample Person");
    Ok(())
}

#[test]
fn reset_without_yes_exits_with_two() -> Result<()> {
    let tmp = tempdir()?;
    let output = ironward(tmp.path())?.arg("reset").output()?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[test]
fn corrupt_collection_fails_db_status() -> Result<()> {
    let tmp = tempdir()?;
    let input = tmp.path().join("broken.json");
    std::fs::write(&input, "[]")?;
    ironward(tmp.path())?
        .args(["console", "set", "cases"])
        .arg(&input)
        .args(["--passphrase", "dev123"])
        .assert()
        .success();

    let db_path = tmp.path().join("ironward.sqlite3");
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let pool = ironward_lib::db::open_sqlite_pool(&db_path)?;
        sqlx::query("UPDATE collections SET payload = 'not json' WHERE name = 'cases'")
            .execute(&pool)
            .await?;
        pool.close().await;
        anyhow::Ok(())
    })?;

    let output = ironward(tmp.path())?.args(["db", "status"]).output()?;
    assert_eq!(output.status.code(), Some(3));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Status       : error"));
    assert!(stdout.contains("cases"));
    Ok(())
}
