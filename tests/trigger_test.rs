use std::fs;
use std::process::Command;
use tempfile::tempdir;

const CONFIG: &str = r#"{
    "auth": "s3cret",
    "last_update": 1700000000,
    "db": {
        "left": {"dsn": "mysql:host=127.0.0.1;port=1", "user": "app", "password": "pw", "db": "shop"},
        "right": {"dsn": "mysql:host=127.0.0.1;port=1", "user": "app", "password": "pw", "db": "shop"}
    }
}"#;

#[test]
fn test_trigger_with_wrong_secret_is_rejected() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.json");
    fs::write(&config_path, CONFIG).unwrap();

    let bin_path = env!("CARGO_BIN_EXE_rowmirror");

    let output = Command::new(bin_path)
        .arg("trigger")
        .arg("--config")
        .arg(&config_path)
        .arg("--auth")
        .arg("wrong")
        .env_remove("ROWMIRROR_AUTH")
        .env_remove("ROWMIRROR_CONFIG")
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("Unauthorized"));

    // Nothing ran, so the watermark is untouched.
    let saved = fs::read_to_string(&config_path).unwrap();
    assert_eq!(saved, CONFIG);
}

#[test]
fn test_trigger_without_config_is_rejected() {
    let temp_dir = tempdir().unwrap();

    let bin_path = env!("CARGO_BIN_EXE_rowmirror");

    let output = Command::new(bin_path)
        .arg("trigger")
        .arg("--config")
        .arg(temp_dir.path().join("missing.json"))
        .arg("--auth")
        .arg("s3cret")
        .env_remove("ROWMIRROR_AUTH")
        .env_remove("ROWMIRROR_CONFIG")
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("Unauthorized"));
}

#[test]
fn test_sync_without_config_reports_config_error() {
    let temp_dir = tempdir().unwrap();

    let bin_path = env!("CARGO_BIN_EXE_rowmirror");

    let output = Command::new(bin_path)
        .arg("sync")
        .arg("--config")
        .arg(temp_dir.path().join("missing.json"))
        .env_remove("ROWMIRROR_CONFIG")
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("Configuration error"));
}
