use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// `options` prints the assembled command without launching anything.
#[test]
fn test_options_dry_run() {
    cargo_bin_cmd!("sqlwarden")
        .args(&["--sqlmap-path", "sqlmap.py", "options", "level=3", "dbms=mysql", "random-agent"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY RUN]"))
        .stdout(predicate::str::contains(
            "sqlmap.py -u http://target/ --batch --dbms=mysql --level=3 --random-agent",
        ));
}

/// `batch=true` from the user must not produce a second `--batch`.
#[test]
fn test_options_batch_not_duplicated() {
    cargo_bin_cmd!("sqlwarden")
        .args(&["options", "batch=true", "-u", "http://example.com/?id=1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-u http://example.com/?id=1 --batch\r\n"));
}

#[test]
fn test_options_empty_key_fails() {
    cargo_bin_cmd!("sqlwarden")
        .args(&["options", "=3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty option name"));
}

/// Running with no arguments should fail (clap requires a subcommand).
#[test]
fn test_no_args_shows_error() {
    cargo_bin_cmd!("sqlwarden").assert().failure();
}

#[test]
fn test_help_lists_subcommands() {
    cargo_bin_cmd!("sqlwarden")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("options"));
}

#[test]
fn test_invalid_target_rejected() {
    cargo_bin_cmd!("sqlwarden")
        .args(&["scan", "ftp://example.com/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid target"));

    cargo_bin_cmd!("sqlwarden")
        .args(&["start", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid target"));
}

#[test]
fn test_missing_config_file_fails() {
    cargo_bin_cmd!("sqlwarden")
        .args(&["--config", "/nonexistent/sqlwarden.json", "options"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config"));
}

/// Config file values apply, and flags win over them.
#[test]
fn test_config_file_then_flags() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"scriptPath": "/opt/sqlmap/sqlmap.py", "interpreter": "sh"}}"#).unwrap();
    let path = file.path().to_str().unwrap().to_string();

    cargo_bin_cmd!("sqlwarden")
        .env_remove("SQLMAP_PATH")
        .env_remove("SQLMAP_PYTHON")
        .args(&["--config", &path, "options", "level=2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/opt/sqlmap/sqlmap.py -u http://target/ --batch --level=2"));

    cargo_bin_cmd!("sqlwarden")
        .env_remove("SQLMAP_PATH")
        .env_remove("SQLMAP_PYTHON")
        .args(&["--config", &path, "--sqlmap-path", "/srv/sqlmap.py", "options"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/srv/sqlmap.py -u http://target/ --batch"));
}

#[cfg(unix)]
fn fake_engine(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", body).unwrap();
    file
}

#[cfg(unix)]
#[test]
fn test_scan_with_fake_engine() {
    let engine = fake_engine("echo \"$@\"\n");
    let path = engine.path().to_str().unwrap().to_string();

    cargo_bin_cmd!("sqlwarden")
        .args(&["--python", "sh", "--sqlmap-path", &path, "scan", "http://target/?id=1", "--arg=--level=3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-u http://target/?id=1 --batch --level=3"));
}

#[cfg(unix)]
#[test]
fn test_start_prints_final_status() {
    let engine = fake_engine(
        "echo \"[10:00:01] [INFO] GET parameter 'id' is vulnerable. Do you want to keep testing the others (if any)? [y/N] N\"\n\
         echo 'back-end DBMS: MySQL >= 5.0'\n",
    );
    let path = engine.path().to_str().unwrap().to_string();

    cargo_bin_cmd!("sqlwarden")
        .args(&["--python", "sh", "--sqlmap-path", &path, "start", "http://target/?id=1", "--interval", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"completed\""))
        .stdout(predicate::str::contains("\"parameter\": \"id\""))
        .stdout(predicate::str::contains("MySQL >= 5.0"));
}

#[cfg(unix)]
#[test]
fn test_start_failed_scan_exits_non_zero() {
    let engine = fake_engine("echo 'connection refused' >&2\nexit 1\n");
    let path = engine.path().to_str().unwrap().to_string();

    cargo_bin_cmd!("sqlwarden")
        .args(&["--python", "sh", "--sqlmap-path", &path, "start", "http://target/", "--interval", "1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"failed\""))
        .stdout(predicate::str::contains("connection refused"));
}

#[cfg(unix)]
#[test]
fn test_scan_engine_failure_exits_non_zero() {
    let engine = fake_engine("echo 'bad args' >&2\nexit 2\n");
    let path = engine.path().to_str().unwrap().to_string();

    cargo_bin_cmd!("sqlwarden")
        .args(&["--python", "sh", "--sqlmap-path", &path, "scan", "http://target/"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("sqlmap failed (exit code 2)"));
}

#[cfg(unix)]
#[test]
fn test_scan_timeout_exits_non_zero() {
    let engine = fake_engine("sleep 10\n");
    let path = engine.path().to_str().unwrap().to_string();

    cargo_bin_cmd!("sqlwarden")
        .args(&["--python", "sh", "--sqlmap-path", &path, "--timeout", "1", "scan", "http://target/"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("sqlmap timed out after 1 seconds"));
}
