use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn docqa_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docqa"))
}

const HANDBOOK: &str = "Employee Handbook\n\n\
Vacation policy. Every employee receives twenty five vacation days per year. \
Unused vacation days carry over to the next year up to a limit of five days.\n\n\
Remote work. Employees may work remotely on Mondays and Fridays. \
Remote work on other days requires approval from a manager.\n\n\
Equipment. The company provides a laptop and a monitor to every employee. \
Broken equipment must be reported to the help desk within two days.\n\n\
Expenses. Travel expenses are reimbursed within thirty days of submission. \
Receipts are required for every expense above fifty dollars.";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("handbook.txt"), HANDBOOK).unwrap();

    let config_content = format!(
        r#"[chunking]
chunk_size = 200
chunk_overlap = 20

[retrieval]
top_k = 2

[embedding]
provider = "hash"
dims = 256

[index]
path = "{}/data/index.json"
"#,
        root.display()
    );

    let config_path = config_dir.join("docqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn handbook(config_path: &Path) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("handbook.txt")
        .to_string_lossy()
        .to_string()
}

#[test]
fn test_chunk_dry_run() {
    let (_tmp, config_path) = setup_test_env();
    let file = handbook(&config_path);

    let (stdout, stderr, success) = run_docqa(&config_path, &["chunk", &file]);
    assert!(success, "chunk failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("chunks (size 200, overlap 20"));
    assert!(stdout.contains("[0] @0"));
}

#[test]
fn test_chunk_json_output() {
    let (_tmp, config_path) = setup_test_env();
    let file = handbook(&config_path);

    let (stdout, _, success) = run_docqa(&config_path, &["chunk", &file, "--json"]);
    assert!(success);
    let chunks: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let chunks = chunks.as_array().unwrap();
    assert!(chunks.len() > 1);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c["index"], i);
        assert!(c["text"].as_str().unwrap().chars().count() <= 200);
    }
}

#[test]
fn test_index_build_info_and_ask() {
    let (tmp, config_path) = setup_test_env();
    let file = handbook(&config_path);

    let (stdout, stderr, success) = run_docqa(&config_path, &["index", "build", &file]);
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("chunks)"));
    assert!(tmp.path().join("data/index.json").exists());

    let (stdout, _, success) = run_docqa(&config_path, &["index", "info"]);
    assert!(success);
    assert!(stdout.contains("feature-hash-v1"));
    assert!(stdout.contains("256"));
    assert!(stdout.contains("cosine"));

    let (stdout, stderr, success) = run_docqa(
        &config_path,
        &["ask", "How many vacation days does an employee receive?"],
    );
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Answer:"));
    assert!(stdout.contains("Sources:"));
    assert!(stdout.to_lowercase().contains("vacation"));
}

#[test]
fn test_ask_respects_k() {
    let (_tmp, config_path) = setup_test_env();
    let file = handbook(&config_path);
    run_docqa(&config_path, &["index", "build", &file]);

    let (stdout, _, success) = run_docqa(&config_path, &["ask", "remote work", "--k", "1"]);
    assert!(success);
    assert!(stdout.contains("  1. "));
    assert!(!stdout.contains("  2. "));
}

#[test]
fn test_ask_without_index_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_docqa(&config_path, &["ask", "anything?"]);
    assert!(!success);
    assert!(stderr.contains("index not found"), "stderr={}", stderr);
}

#[test]
fn test_index_build_rejects_empty_document() {
    let (tmp, config_path) = setup_test_env();
    let empty = tmp.path().join("empty.txt");
    fs::write(&empty, "  \n ").unwrap();

    let (_, stderr, success) =
        run_docqa(&config_path, &["index", "build", empty.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("no extractable text"), "stderr={}", stderr);
}

#[test]
fn test_chat_loop_answers_until_exit() {
    let (_tmp, config_path) = setup_test_env();
    let file = handbook(&config_path);

    let mut child = Command::new(docqa_binary())
        .arg("--config")
        .arg(&config_path)
        .args(["chat", &file])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"When are expenses reimbursed?\n\nexit\nnever asked\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Loaded"));
    assert_eq!(stdout.matches("Answer:").count(), 1);
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[chunking]\nchunk_size = 10\nchunk_overlap = 10\n").unwrap();

    let (_, stderr, success) = run_docqa(&config_path, &["chunk", "whatever.txt"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr={}", stderr);
}

#[test]
fn test_missing_explicit_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docqa(&tmp.path().join("nope.toml"), &["chunk", "x.txt"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
