use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn crowdcrawl_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("crowdcrawl");
    path
}

const BATCH: &str = r#"{
  "user_id_hash": "u1",
  "timestamp": 1700000000000,
  "items": [
    {
      "url": "http://a.example/",
      "status": "ok",
      "timestamp": 1700000000000,
      "content": {
        "title": "A",
        "extract": "Site A",
        "links": ["http://b.example/x", "http://spam.example/y"]
      }
    },
    {
      "url": "http://c.example/",
      "status": "timeout",
      "timestamp": 1700000000001,
      "error": {"name": "ReadTimeout", "message": "timed out"}
    }
  ]
}"#;

fn setup_test_env(num_pages: u64) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("blacklist.txt"), "# test list\nspam.example\n").unwrap();

    let batch_dir = root.join("batches");
    fs::create_dir_all(&batch_dir).unwrap();
    fs::write(batch_dir.join("batch1.json"), BATCH).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/crowdcrawl.sqlite"

[ingest]
batch_limit = 100
retry_delay_secs = 1

[index]
num_pages = {num_pages}

[blacklist]
path = "{root}/config/blacklist.txt"
"#,
        root = root.display(),
        num_pages = num_pages,
    );

    let config_path = config_dir.join("crowdcrawl.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_crowdcrawl(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = crowdcrawl_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run crowdcrawl binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn batch_file(config_path: &Path) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("batches/batch1.json").display().to_string()
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(16);

    let (stdout, stderr, success) = run_crowdcrawl(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_crowdcrawl(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_import_and_reconcile() {
    let (_tmp, config_path) = setup_test_env(16);
    let batch = batch_file(&config_path);

    run_crowdcrawl(&config_path, &["init"]);
    let (stdout, stderr, success) = run_crowdcrawl(&config_path, &["batch", "import", &batch]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("batches: 1"));
    assert!(stdout.contains("items: 2"));

    let (stdout, stderr, success) = run_crowdcrawl(&config_path, &["reconcile"]);
    assert!(success, "reconcile failed: stdout={}, stderr={}", stdout, stderr);
    // a.example/ crawled, c.example/ timed out, b.example/x and its root discovered
    assert!(stdout.contains("batches: 1"), "stdout={}", stdout);
    assert!(stdout.contains("found urls: 4"), "stdout={}", stdout);
    assert!(stdout.contains("new urls: 4"), "stdout={}", stdout);
    assert!(stdout.contains("source domains: 1"), "stdout={}", stdout);
    assert!(stdout.contains("blacklisted domains: 1"), "stdout={}", stdout);

    // The batch is now reconciled; nothing is left to do.
    let (stdout, _, success) = run_crowdcrawl(&config_path, &["reconcile"]);
    assert!(success);
    assert!(stdout.contains("batches: 0"), "stdout={}", stdout);
}

#[test]
fn test_queue_receives_new_urls_once() {
    let (_tmp, config_path) = setup_test_env(16);
    let batch = batch_file(&config_path);

    run_crowdcrawl(&config_path, &["init"]);
    run_crowdcrawl(&config_path, &["batch", "import", &batch]);
    run_crowdcrawl(&config_path, &["reconcile"]);

    let (stdout, stderr, success) = run_crowdcrawl(&config_path, &["queue", "pop"]);
    assert!(success, "queue pop failed: {}", stderr);
    let mut urls: Vec<&str> = stdout.lines().collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "http://a.example/",
            "http://b.example/",
            "http://b.example/x",
            "http://c.example/",
        ]
    );
    assert!(!stdout.contains("spam.example"));

    // Re-importing the same batch finds nothing new, so nothing is queued.
    run_crowdcrawl(&config_path, &["batch", "import", &batch]);
    let (stdout, _, _) = run_crowdcrawl(&config_path, &["reconcile"]);
    assert!(stdout.contains("new urls: 0"), "stdout={}", stdout);

    let (stdout, stderr, success) = run_crowdcrawl(&config_path, &["queue", "pop"]);
    assert!(success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("queue is empty"));
}

#[test]
fn test_stats_reports_statuses() {
    let (_tmp, config_path) = setup_test_env(16);
    let batch = batch_file(&config_path);

    run_crowdcrawl(&config_path, &["init"]);
    run_crowdcrawl(&config_path, &["batch", "import", &batch]);
    run_crowdcrawl(&config_path, &["reconcile"]);

    let (stdout, stderr, success) = run_crowdcrawl(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("urls_updated"));
    assert!(stdout.contains("crawled"));
    assert!(stdout.contains("error_timeout"));
    assert!(stdout.contains("Domain links: 1"));
    assert!(stdout.contains("Queued sets:  1"));
}

#[test]
fn test_curate_and_reject() {
    let (tmp, config_path) = setup_test_env(1);
    run_crowdcrawl(&config_path, &["init"]);

    let request = tmp.path().join("curation.json");
    fs::write(
        &request,
        r#"{
  "timestamp": 1700000000000,
  "url": "https://search.example/?q=Rust+Lang",
  "curation_type": "begin",
  "curation": {"timestamp": 1700000000000},
  "results": [
    {"title": "Rust", "url": "https://rust-lang.org/", "extract": "A language", "validated": true, "source": "user"},
    {"title": "Book", "url": "https://doc.rust-lang.org/book/", "extract": "The book", "validated": false, "source": "google"}
  ]
}"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_crowdcrawl(
        &config_path,
        &["curate", request.to_str().unwrap(), "--user", "alice"],
    );
    assert!(success, "curate failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("curate \"rust lang\""), "stdout={}", stdout);
    assert!(stdout.contains("page: 0"));
    assert!(stdout.contains("curated documents: 2"));

    let rejected = tmp.path().join("rejected.json");
    fs::write(
        &rejected,
        r#"{
  "timestamp": 1700000000000,
  "url": "https://search.example/?q=foo&lang=en",
  "curation_type": "add",
  "results": []
}"#,
    )
    .unwrap();

    let (_, stderr, success) = run_crowdcrawl(
        &config_path,
        &["curate", rejected.to_str().unwrap(), "--user", "alice"],
    );
    assert!(!success);
    assert!(stderr.contains("one query parameter"), "stderr={}", stderr);

    // Both requests are in the audit log, rejected or not.
    let (stdout, _, _) = run_crowdcrawl(&config_path, &["stats"]);
    assert!(stdout.contains("Curations:    2"), "stdout={}", stdout);
}
