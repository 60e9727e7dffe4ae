#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use sqlwarden_core::{
    BatchOutcome, EngineConfig, OptionValue, ScanOptions, SqlmapService, StatusReply, TaskStatus,
};
use tempfile::TempDir;

/// Writes a shell script standing in for sqlmap and points a config at it.
fn fake_engine(dir: &TempDir, body: &str, timeout_secs: u64) -> EngineConfig {
    let path: PathBuf = dir.path().join("sqlmap.sh");
    fs::write(&path, body).unwrap();
    EngineConfig {
        interpreter: Some("sh".to_string()),
        script_path: path,
        timeout_secs,
        tail_lines: 20,
    }
}

const VULNERABLE_RUN: &str = r#"
echo "[10:00:00] [INFO] testing connection to the target URL"
echo "[10:00:01] [INFO] GET parameter 'id' is vulnerable. Do you want to keep testing the others (if any)? [y/N] N"
echo "[10:00:01] [CRITICAL] parameter 'id' is vulnerable to boolean-based blind"
cat <<'OUT'
sqlmap identified the following injection point(s) with a total of 46 HTTP(s) requests:
---
Parameter: id (GET)
    Type: boolean-based blind
    Title: AND boolean-based blind - WHERE or HAVING clause
    Payload: id=1 AND 5523=5523
---

back-end DBMS: MySQL >= 5.0
OUT
echo "stderr warning" >&2
exit 0
"#;

#[tokio::test]
async fn test_task_scan_completes_with_findings() {
    let dir = TempDir::new().unwrap();
    let service = SqlmapService::new(fake_engine(&dir, VULNERABLE_RUN, 60));

    let receipt = service.start_scan("http://target/item.php?id=1", ScanOptions::new()).await;
    service.manager().wait(&receipt.task_id).await.unwrap();

    let view = match service.get_scan_status(&receipt.task_id).await {
        StatusReply::Status(view) => view,
        StatusReply::Error { error } => panic!("unexpected error: {}", error),
    };
    assert_eq!(view.status, TaskStatus::Completed);
    assert!(view.summary.unwrap().contains("Parameter: id (GET)"));
    assert!(view.partial_output.is_none());

    let results = view.results.unwrap();
    let for_id: Vec<_> = results.iter().filter(|f| f.parameter.as_deref() == Some("id")).collect();
    assert_eq!(for_id.len(), 1, "live detection must not duplicate the block finding");
    assert_eq!(for_id[0].kind, "boolean-based blind");
    assert!(results.iter().any(|f| f.kind == "DBMS" && f.info.as_deref() == Some("MySQL >= 5.0")));
    assert!(results.iter().any(|f| f.kind == "CRITICAL"));

    let task = service.manager().store().get(&receipt.task_id).await.unwrap();
    assert_eq!(task.return_code, Some(0));
    assert!(task.output.contains("[ERROR] stderr warning\n"));
    assert_eq!(task.vulnerabilities.len(), 2);
    assert!(task.vulnerabilities.iter().all(|f| f.parameter.as_deref() == Some("id")));
    assert!(task.ended_at.is_some());
}

#[tokio::test]
async fn test_task_scan_non_zero_exit_fails() {
    let dir = TempDir::new().unwrap();
    let body = "echo '[INFO] starting'\necho 'invalid target' >&2\necho 'giving up' >&2\nexit 3\n";
    let service = SqlmapService::new(fake_engine(&dir, body, 60));

    let receipt = service.start_scan("http://target/", ScanOptions::new()).await;
    service.manager().wait(&receipt.task_id).await.unwrap();

    let view = service.manager().status(&receipt.task_id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Failed);
    assert_eq!(view.error.as_deref(), Some("giving up"));
    assert!(view.results.is_none());

    let task = service.manager().store().get(&receipt.task_id).await.unwrap();
    assert_eq!(task.return_code, Some(3));
}

#[tokio::test]
async fn test_status_moves_forward_and_output_grows() {
    let dir = TempDir::new().unwrap();
    let body = "echo first\nsleep 1\necho second\nsleep 1\necho third\n";
    let service = SqlmapService::new(fake_engine(&dir, body, 60));

    let receipt = service.start_scan("http://target/", ScanOptions::new()).await;

    let order = |s: TaskStatus| match s {
        TaskStatus::Queued => 0,
        TaskStatus::Running => 1,
        TaskStatus::Completed | TaskStatus::Failed => 2,
    };

    let mut last_rank = 0;
    let mut last_len = 0;
    let mut saw_running = false;
    let deadline = Instant::now() + Duration::from_secs(20);

    loop {
        let task = service.manager().store().get(&receipt.task_id).await.unwrap();
        let rank = order(task.status);
        assert!(rank >= last_rank, "status went backwards");
        if task.status == TaskStatus::Running {
            saw_running = true;
            assert!(task.output.len() >= last_len, "output shrank while running");
            last_len = task.output.len();

            let view = service.manager().status(&receipt.task_id).await.unwrap();
            if view.status == TaskStatus::Running {
                assert!(view.partial_output.is_some());
            }
        }
        last_rank = rank;
        if rank == 2 || Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    service.manager().wait(&receipt.task_id).await.unwrap();
    let task = service.manager().store().get(&receipt.task_id).await.unwrap();
    assert!(saw_running);
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output, "first\nsecond\nthird\n");
}

#[tokio::test]
async fn test_options_reach_the_engine() {
    let dir = TempDir::new().unwrap();
    let service = SqlmapService::new(fake_engine(&dir, "echo \"$@\"\n", 60));

    let options = ScanOptions::new()
        .with("level", OptionValue::Number(3u64.into()))
        .with("dbms", OptionValue::Text("mysql".to_string()))
        .with("random-agent", OptionValue::Flag(true));
    let receipt = service.start_scan("http://target/?id=1", options).await;
    service.manager().wait(&receipt.task_id).await.unwrap();

    let task = service.manager().store().get(&receipt.task_id).await.unwrap();
    assert_eq!(
        task.output,
        "-u http://target/?id=1 --batch --dbms=mysql --level=3 --random-agent\n"
    );
}

#[tokio::test]
async fn test_batch_returns_raw_output_without_markers() {
    let dir = TempDir::new().unwrap();
    let service = SqlmapService::new(fake_engine(&dir, "printf 'plain engine output\\nline two\\n'\n", 60));

    let out = service.scan("http://target/", &[]).await;
    assert_eq!(out, "plain engine output\nline two\n");
}

#[tokio::test]
async fn test_batch_report_with_marker() {
    let dir = TempDir::new().unwrap();
    let body = "echo '开始检测 http://target/'\necho 'Time-based blind SQL injection detected'\necho 'back-end DBMS: PostgreSQL'\n";
    let service = SqlmapService::new(fake_engine(&dir, body, 60));

    let out = service.scan("http://target/", &[]).await;
    assert!(out.starts_with("# SQL Injection Scan Report"));
    assert!(out.contains("- Time-based blind\n"));
    assert!(out.contains("- **Type**: PostgreSQL\n"));
}

#[tokio::test]
async fn test_batch_falls_back_to_stderr_and_reports_failures() {
    let dir = TempDir::new().unwrap();
    let service = SqlmapService::new(fake_engine(&dir, "echo 'only stderr' >&2\n", 60));
    assert_eq!(service.scan("http://target/", &[]).await, "only stderr\n");

    let dir = TempDir::new().unwrap();
    let service = SqlmapService::new(fake_engine(&dir, "echo 'bad args' >&2\nexit 2\n", 60));
    assert_eq!(
        service.scan("http://target/", &[]).await,
        "sqlmap failed (exit code 2)\nbad args\n"
    );
    assert_eq!(
        service.scan_outcome("http://target/", &[]).await,
        BatchOutcome::Failed { code: 2, stderr: "bad args\n".to_string() }
    );
}

#[tokio::test]
async fn test_batch_timeout_leaves_registry_untouched() {
    let dir = TempDir::new().unwrap();
    let service = SqlmapService::new(fake_engine(&dir, "sleep 10\n", 1));

    let started = Instant::now();
    let out = service.scan("http://target/", &[]).await;
    assert_eq!(out, "sqlmap timed out after 1 seconds");
    assert!(started.elapsed() < Duration::from_secs(8));

    let listing = service.list_scans(true).await;
    assert!(listing.active_tasks.is_empty());
    assert!(listing.completed_tasks.is_empty());
}
