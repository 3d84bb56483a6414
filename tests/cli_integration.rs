use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Environment variables that would otherwise leak host settings into the
/// binary under test.
const SCRUBBED_ENV: &[&str] = &[
    "GATEWAY_BIND",
    "GATEWAY_LOG",
    "GATEWAY_ENV",
    "CONTENT_PROVIDER",
    "CMS_PROJECT_ID",
    "CMS_DATASET",
    "CMS_API_VERSION",
    "CMS_READ_TOKEN",
    "CMS_USE_CDN",
    "CMS_API_HOST",
    "CMS_REQUEST_TIMEOUT_MS",
    "CMS_MAX_RETRIES",
    "CMS_RETRY_DELAY_MS",
    "ARTICLES_SOURCE_MODE",
    "ARTICLES_CMS_ENABLED",
    "PAGES_SOURCE_MODE",
    "PAGES_CMS_ENABLED",
    "STATIC_CONTENT_ROOT",
    "RUST_LOG",
];

fn gateway_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("content-gateway");
    path
}

fn setup_test_env(environment: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let articles = root.join("content/articles");
    fs::create_dir_all(&articles).unwrap();
    fs::write(
        articles.join("hello.md"),
        "---\ntitle: Hello\ndate: 2025-01-15\n---\n\nFirst paragraph.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[runtime]
environment = "{}"

[provider]
backend = "cms"

[sources.articles]
mode = "static"

[static_content]
root = "{}/content"
"#,
        environment,
        root.display()
    );

    let config_path = root.join("gateway.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gateway(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gateway_binary();
    let mut command = Command::new(&binary);
    for key in SCRUBBED_ENV {
        command.env_remove(key);
    }
    let output = command
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gateway binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_check_reports_fallback() {
    let (_tmp, config) = setup_test_env("development");
    let (stdout, stderr, success) = run_gateway(&config, &["check"]);
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("active provider: static"));
    assert!(stdout.contains("fallback: CMS project id and dataset not configured"));
    assert!(stdout.contains("articles source: static"));
}

#[test]
fn test_production_misconfiguration_is_fatal() {
    let (_tmp, config) = setup_test_env("production");
    let (_stdout, stderr, success) = run_gateway(&config, &["check"]);
    assert!(!success);
    assert!(stderr.contains("MISCONFIGURED"), "stderr: {}", stderr);
}

#[test]
fn test_articles_prints_envelope() {
    let (_tmp, config) = setup_test_env("development");
    let (stdout, stderr, success) = run_gateway(&config, &["articles"]);
    assert!(success, "articles failed: {}", stderr);

    let envelope: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"][0]["slug"], "hello");
    assert_eq!(envelope["data"][0]["publishedAt"], "2025-01-15");
}

#[test]
fn test_missing_article_prints_not_found() {
    let (_tmp, config) = setup_test_env("development");
    let (stdout, _stderr, success) = run_gateway(&config, &["articles", "nope"]);
    assert!(!success);

    let envelope: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["code"], "NOT_FOUND");
}
